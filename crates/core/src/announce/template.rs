//! Minimal `{{ .name }}` template substitution.
//!
//! Download URL templates only ever substitute named string variables, so a
//! purpose-built substituter keeps the contract explicit: an unknown
//! variable renders as the empty string, everything else passes through
//! verbatim.

use std::collections::HashMap;

/// Render `template`, replacing each `{{ .name }}` token with the matching
/// value from `vars`. Missing variables render empty; malformed tokens are
/// left as-is.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            // Unterminated token; emit the remainder untouched.
            out.push_str(&rest[start..]);
            return out;
        };

        let token = after_open[..end].trim();
        match token.strip_prefix('.') {
            Some(name) if !name.is_empty() && !name.contains(char::is_whitespace) => {
                if let Some(value) = vars.get(name) {
                    out.push_str(value);
                }
            }
            _ => {
                // Not a variable reference; keep the literal text.
                out.push_str(&rest[start..start + 2 + end + 2]);
            }
        }

        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    out
}
