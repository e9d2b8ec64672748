use std::collections::HashMap;

/// Substitutes `{{var}}` placeholders in a system template using a flat
/// variable map. Unresolved placeholders are left verbatim rather than
/// erroring — the pack's template author controls what variables are
/// assumed present, and a missing one is more useful visible in the
/// rendered prompt than silently dropped.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let key = after_open[..end].trim();
        match variables.get(key) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str("{{");
                out.push_str(key);
                out.push_str("}}");
            }
        }
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variable() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Ada".to_string());
        assert_eq!(render_template("Hello {{name}}!", &vars), "Hello Ada!");
    }

    #[test]
    fn leaves_unknown_placeholder_verbatim() {
        let vars = HashMap::new();
        assert_eq!(render_template("Hello {{name}}!", &vars), "Hello {{name}}!");
    }

    #[test]
    fn trims_whitespace_inside_braces() {
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), "1".to_string());
        assert_eq!(render_template("{{ x }}", &vars), "1");
    }

    #[test]
    fn no_placeholders_returns_template_unchanged() {
        let vars = HashMap::new();
        assert_eq!(render_template("plain text", &vars), "plain text");
    }
}
