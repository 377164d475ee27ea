//! Stitches the macro table and call fragments into a complete C program.
//!
//! In the threaded topologies every thread shares `r[]` without locking; the only ordering
//! between fragments is the sleep between spawns.

use crate::emit::{Calls, Fragment};
use crate::generate::Topology;
use crate::macros::MacroDef;

const PREAMBLE: &str = "// autogenerated by csource
#include <unistd.h>
#include <sys/syscall.h>
#include <string.h>
#include <stdint.h>
#include <pthread.h>

";

/// Microseconds between staggered thread spawns.
pub const SPAWN_STAGGER_US: u64 = 10_000;
/// Microseconds `main` waits for the last threads before exiting.
pub const FINAL_WAIT_US: u64 = 100_000;

pub fn assemble(macros: &[MacroDef], calls: &Calls, topology: Topology) -> String {
    let mut w = Writer::default();
    w.out.push_str(PREAMBLE);
    for def in macros {
        w.out.push_str(&def.render());
    }
    w.line("");
    w.line(&format!("long r[{}];", calls.result_slots));
    w.line("");

    match topology {
        Topology::Sequential => w.sequential_main(&calls.fragments),
        Topology::Threaded => w.threaded_main(&calls.fragments, false),
        Topology::Collision => w.threaded_main(&calls.fragments, true),
    }
    w.out
}

#[derive(Clone, Copy)]
enum Stagger {
    EveryThread,
    /// Second collision wave: threads spawned back to back in pairs.
    EvenThreads,
}

#[derive(Default)]
struct Writer {
    out: String,
    indent: usize,
}

impl Writer {
    fn line(&mut self, s: &str) {
        if !s.is_empty() {
            for _ in 0..self.indent {
                self.out.push('\t');
            }
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn open_block(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    fn close_block(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }

    fn fragment(&mut self, frag: &Fragment) {
        self.out.push_str(&frag.render(self.indent));
    }

    fn reset_results(&mut self) {
        self.line("memset(r, -1, sizeof(r));");
    }

    fn sequential_main(&mut self, fragments: &[Fragment]) {
        self.line("int main()");
        self.open_block();
        self.reset_results();
        for frag in fragments {
            self.fragment(frag);
        }
        self.line("return 0;");
        self.close_block();
    }

    fn threaded_main(&mut self, fragments: &[Fragment], collide: bool) {
        let n = fragments.len();

        self.line("void *thr(void *arg)");
        self.open_block();
        self.line("switch ((long)arg) {");
        for (i, frag) in fragments.iter().enumerate() {
            self.line(&format!("case {i}:"));
            self.indent += 1;
            self.fragment(frag);
            self.line("break;");
            self.indent -= 1;
        }
        self.line("}");
        self.line("return 0;");
        self.close_block();
        self.line("");

        self.line("int main()");
        self.open_block();
        self.line("long i;");
        self.line(&format!("pthread_t th[{n}];"));
        self.line("");
        self.reset_results();
        self.spawn_loop(n, Stagger::EveryThread);
        if collide {
            self.spawn_loop(n, Stagger::EvenThreads);
        }
        self.line(&format!("usleep({FINAL_WAIT_US});"));
        self.line("return 0;");
        self.close_block();
    }

    fn spawn_loop(&mut self, n: usize, stagger: Stagger) {
        self.line(&format!("for (i = 0; i < {n}; i++) {{"));
        self.indent += 1;
        self.line("pthread_create(&th[i], 0, thr, (void*)i);");
        match stagger {
            Stagger::EveryThread => self.line(&format!("usleep({SPAWN_STAGGER_US});")),
            Stagger::EvenThreads => {
                self.line("if (i%2==0)");
                self.indent += 1;
                self.line(&format!("usleep({SPAWN_STAGGER_US});"));
                self.indent -= 1;
            }
        }
        self.indent -= 1;
        self.line("}");
    }
}
