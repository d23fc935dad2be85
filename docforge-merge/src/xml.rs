//! Small string-level XML helpers shared by the document and workbook paths

use regex::Regex;

pub fn escape_text(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

pub fn escape_attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).into_owned()
}

pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

fn attr_regex(name: &str) -> Option<Regex> {
    Regex::new(&format!(r#"\s{}\s*=\s*"[^"]*""#, regex::escape(name))).ok()
}

/// Value of attribute `name` in an attribute string or start tag
pub fn get_attr(attrs: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"\s{}\s*=\s*"([^"]*)""#, regex::escape(name))).ok()?;
    re.captures(attrs).map(|c| c[1].to_string())
}

/// Sets, replaces or (with `None`) removes an attribute in an attribute string
pub fn set_attr(attrs: &str, name: &str, value: Option<&str>) -> String {
    let stripped = match attr_regex(name) {
        Some(re) => re.replace_all(attrs, "").into_owned(),
        None => attrs.to_string(),
    };
    match value {
        Some(value) => format!("{} {}=\"{}\"", stripped, name, escape_attr(value)),
        None => stripped,
    }
}

/// Inserts `element` right before the closing tag `</name>` of the root
pub fn insert_before_close(xml: &str, close_tag: &str, element: &str) -> Option<String> {
    let pos = xml.rfind(close_tag)?;
    let mut out = String::with_capacity(xml.len() + element.len());
    out.push_str(&xml[..pos]);
    out.push_str(element);
    out.push_str(&xml[pos..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn test_set_attr_replaces_and_removes() {
        let attrs = r#" r="B2" s="3" t="s""#;
        assert_eq!(set_attr(attrs, "t", None), r#" r="B2" s="3""#);
        assert_eq!(set_attr(attrs, "s", Some("7")), r#" r="B2" t="s" s="7""#);
        assert_eq!(get_attr(attrs, "r").as_deref(), Some("B2"));
        assert_eq!(get_attr(attrs, "x"), None);
    }

    #[test]
    fn test_insert_before_close() {
        let xml = "<Types><Default/></Types>";
        assert_eq!(
            insert_before_close(xml, "</Types>", "<Override/>").unwrap(),
            "<Types><Default/><Override/></Types>"
        );
    }
}
