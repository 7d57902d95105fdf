//! Control page rendering.

use crate::rules::RuleList;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const RULES_SLOT: &str = "{{rules}}";

/// Renders the control page listing `rules`.
pub fn render(rules: &RuleList) -> String {
    let mut rows = String::new();
    if rules.is_empty() {
        rows.push_str("            <tr><td colspan=\"3\" class=\"empty\">No rules yet.</td></tr>\n");
    }
    for (index, rule) in rules.iter().enumerate() {
        rows.push_str(&format!(
            "            <tr><td>{}</td><td><code>{}</code></td><td><code>{}</code></td></tr>\n",
            index + 1,
            html_escape::encode_text(&rule.pattern),
            html_escape::encode_text(&rule.replace),
        ));
    }

    INDEX_TEMPLATE.replacen(RULES_SLOT, &rows, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;

    #[test]
    fn test_render_empty() {
        let html = render(&RuleList::new());
        assert!(html.contains("No rules yet."));
        assert!(!html.contains(RULES_SLOT));
        assert!(html.contains(r#"name="match""#));
        assert!(html.contains(r#"name="replace""#));
    }

    #[test]
    fn test_render_escapes_rules() {
        let rules: RuleList = [Rule::new("<script>", "&amp;").unwrap()].into_iter().collect();
        let html = render(&rules);
        assert!(html.contains("<code>&lt;script&gt;</code>"));
        assert!(html.contains("<code>&amp;amp;</code>"));
        assert!(!html.contains("No rules yet."));
    }
}
