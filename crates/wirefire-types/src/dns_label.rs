//! hostname and tailnet-name sanitisation.
//!
//! hostnames become single dns labels (lowercase alphanumeric and hyphens,
//! max 63 chars, no leading/trailing hyphen). tailnet names keep their dot
//! structure: names that look like email addresses become
//! `<sanitised-local>.<domain>`, everything else is sanitised label by label.

/// maximum length of a single dns label.
const MAX_LABEL_LEN: usize = 63;

/// sanitise an arbitrary string into a single dns label.
///
/// normalises by lowercasing, replacing invalid characters with hyphens,
/// collapsing runs of hyphens, trimming leading/trailing hyphens, and
/// truncating to the label limit. returns `"unknown"` when nothing survives,
/// so callers always get a usable machine name.
pub fn sanitize_hostname(s: &str) -> String {
    sanitize_label(s).unwrap_or_else(|| "unknown".to_string())
}

fn sanitize_label(s: &str) -> Option<String> {
    let lowered: String = s
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '-'
            }
        })
        .collect();

    let mut result = String::new();
    let mut last_was_hyphen = true; // treat start as if preceded by hyphen
    for c in lowered.chars() {
        if c == '-' {
            if !last_was_hyphen && result.len() < MAX_LABEL_LEN {
                result.push(c);
                last_was_hyphen = true;
            }
        } else if result.len() < MAX_LABEL_LEN {
            result.push(c);
            last_was_hyphen = false;
        }
    }

    while result.ends_with('-') {
        result.pop();
    }

    if result.is_empty() { None } else { Some(result) }
}

/// sanitise a tailnet name for use as a dns domain.
///
/// names that parse as an email address (`local@domain`) become
/// `<sanitised-local>.<domain>`; any other name has each dot-separated label
/// sanitised independently and rejoined. the function is idempotent.
pub fn sanitize_tailnet_name(name: &str) -> String {
    let name = name.to_lowercase();

    if let Some((local, domain)) = split_email(&name) {
        let local = sanitize_label(local).unwrap_or_default();
        return format!("{}.{}", local, domain);
    }

    name.split('.')
        .map(|label| sanitize_label(label).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(".")
}

/// split `local@domain` when the name is shaped like an address: exactly one
/// `@`, a non-empty local part, and a dotted domain that is already a clean
/// set of dns labels (the domain is kept verbatim, so it must not need
/// sanitising itself).
fn split_email(name: &str) -> Option<(&str, &str)> {
    let (local, domain) = name.split_once('@')?;
    if local.is_empty() || !domain.contains('.') || domain.contains('@') {
        return None;
    }
    let clean = domain
        .split('.')
        .all(|l| sanitize_label(l).as_deref() == Some(l));
    if !clean {
        return None;
    }
    Some((local, domain))
}
