use std::collections::BTreeSet;

use crate::calls::CallTable;
use crate::exec::Instr;

/// A `SYS_<call_name>` constant the target headers are not known to define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    pub call_name: String,
    pub nr: u64,
}

impl MacroDef {
    pub fn render(&self) -> String {
        let name = &self.call_name;
        format!(
            "#ifndef SYS_{name}\n#define SYS_{name} {}\n#endif\n",
            self.nr
        )
    }
}

/// Collects one definition per distinct header-unknown call, in first-seen order.
pub fn build_macro_table<T>(instrs: &[Instr<'_>], table: &T) -> Vec<MacroDef>
where
    T: CallTable + ?Sized,
{
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for instr in instrs {
        let Instr::Call { meta, .. } = instr else {
            continue;
        };
        let Some(nr) = table.unknown_nr(&meta.call_name) else {
            continue;
        };
        if !seen.insert(meta.call_name.as_str()) {
            continue;
        }
        out.push(MacroDef {
            call_name: meta.call_name.clone(),
            nr,
        });
    }
    out
}
