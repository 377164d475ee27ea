/// Checks that `name` can be pasted into `SYS_<name>` as a C identifier.
pub fn validate_call_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("call name must be non-empty".to_string());
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(format!(
            "invalid call name start (must be [A-Za-z_]): {name:?}"
        ));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "invalid call name char (allowed [A-Za-z0-9_]): {name:?}"
            ));
        }
    }
    Ok(())
}

/// Checks a full call variant name such as `open$dir` or `ioctl$KVM_RUN`.
///
/// The part before `$` must be a C identifier; the variant suffix is free-form but may
/// not be empty or contain whitespace.
pub fn validate_variant_name(name: &str) -> Result<(), String> {
    let (base, variant) = match name.split_once('$') {
        Some((base, variant)) => (base, Some(variant)),
        None => (name, None),
    };
    validate_call_name(base)?;
    if let Some(variant) = variant {
        if variant.is_empty() {
            return Err(format!("invalid call variant (empty suffix): {name:?}"));
        }
        if variant.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(format!(
                "invalid call variant (whitespace or control char): {name:?}"
            ));
        }
    }
    Ok(())
}
