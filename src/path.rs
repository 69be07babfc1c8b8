use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Location inside a JSON document, printed as `produtos.hortifruit[0].nome`.
///
/// The empty path is the document root and prints as `$`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid path `{path}`: {message}")]
pub struct PathError {
    pub path: String,
    pub message: String,
}

impl JsonPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_owned()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parses the dotted form, e.g. `novoMercado.id` or `items[2].nome`.
    /// Keys that are not plain identifiers go in brackets as JSON strings,
    /// e.g. `headers["x.total"]`.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let err = |message: &str| PathError {
            path: path.to_owned(),
            message: message.to_owned(),
        };

        if path.is_empty() || path == "$" {
            return Ok(Self::root());
        }

        let mut segments = vec![];
        let mut key = String::new();
        let mut chars = path.chars().peekable();
        // true right after `]`, where only `.` or `[` may follow
        let mut after_index = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_index {
                        return Err(err("empty key"));
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    after_index = false;
                    if chars.peek().is_none() {
                        return Err(err("path ends with `.`"));
                    }
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    if chars.peek() == Some(&'"') {
                        let quoted = quoted_key(&mut chars).ok_or_else(|| err("bad quoted key"))?;
                        if chars.next() != Some(']') {
                            return Err(err("unclosed `[`"));
                        }
                        segments.push(Segment::Key(quoted));
                        after_index = true;
                        continue;
                    }

                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            Some(_) => return Err(err("index must be a number")),
                            None => return Err(err("unclosed `[`")),
                        }
                    }
                    let index = digits.parse().map_err(|_| err("empty index"))?;
                    segments.push(Segment::Index(index));
                    after_index = true;
                }
                ']' => return Err(err("unexpected `]`")),
                c => {
                    if after_index {
                        return Err(err("expected `.` or `[` after index"));
                    }
                    key.push(c);
                }
            }
        }

        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }

        Ok(Self { segments })
    }

    pub fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                Segment::Key(key) => current.get(key.as_str()),
                Segment::Index(index) => current.get(*index),
            })
    }
}

/// Reads a JSON string literal, opening quote included, off `chars`.
fn quoted_key(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut raw = String::new();
    raw.push(chars.next()?);
    let mut escaped = false;
    loop {
        let c = chars.next()?;
        raw.push(c);
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => break,
            _ => escaped = false,
        }
    }
    serde_json::from_str(&raw).ok()
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty() || key.contains(['.', '[', ']', '"'])
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "$");
        }

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if needs_quoting(key) => {
                    write!(f, "[{}]", Value::String(key.clone()))?
                }
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::JsonPath;
    use super::Segment;

    #[test]
    fn display_matches_dotted_form() {
        let path = JsonPath::root()
            .key("produtos")
            .key("hortifruit")
            .index(0)
            .key("nome");
        assert_eq!(path.to_string(), "produtos.hortifruit[0].nome");
        assert_eq!(JsonPath::root().to_string(), "$");
        assert_eq!(JsonPath::root().index(3).to_string(), "[3]");
    }

    #[test]
    fn parse_round_trips_display() {
        for raw in ["novoMercado.id", "product_item.id", "items[2].nome", "[0]", "a[1][2].b"] {
            assert_eq!(JsonPath::parse(raw).unwrap().to_string(), raw);
        }
        assert_eq!(
            JsonPath::parse("a[1]").unwrap().segments(),
            &[Segment::Key("a".into()), Segment::Index(1)]
        );
    }

    #[test]
    fn keys_with_separators_are_quoted() {
        let dotted_key = JsonPath::root().key("a.b");
        let nested = JsonPath::root().key("a").key("b");

        assert_eq!(dotted_key.to_string(), r#"["a.b"]"#);
        assert_eq!(nested.to_string(), "a.b");
        assert_ne!(dotted_key.to_string(), nested.to_string());

        let header = JsonPath::root().key("headers").key("x[1]").key("v");
        assert_eq!(header.to_string(), r#"headers["x[1]"].v"#);
        assert_eq!(JsonPath::parse(&header.to_string()).unwrap(), header);

        let quote = JsonPath::root().key("say \"oi\"");
        assert_eq!(JsonPath::parse(&quote.to_string()).unwrap(), quote);
    }

    #[test]
    fn quoted_keys_can_be_looked_up() {
        let body = json!({ "a.b": 1, "a": { "b": 2 } });
        assert_eq!(JsonPath::parse(r#"["a.b"]"#).unwrap().lookup(&body), Some(&json!(1)));
        assert_eq!(JsonPath::parse("a.b").unwrap().lookup(&body), Some(&json!(2)));
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        for raw in ["a..b", "a.", ".a", "a[", "a[x]", "a]", "a[1]b", r#"a["b"#, r#"a["b"x]"#] {
            assert!(JsonPath::parse(raw).is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let body = json!({
            "novoMercado": { "id": 41, "produtos": { "hortifruit": [{ "nome": "Kiwi" }] } }
        });

        let id = JsonPath::parse("novoMercado.id").unwrap();
        assert_eq!(id.lookup(&body), Some(&json!(41)));

        let nome = JsonPath::parse("novoMercado.produtos.hortifruit[0].nome").unwrap();
        assert_eq!(nome.lookup(&body), Some(&json!("Kiwi")));

        let missing = JsonPath::parse("novoMercado.produtos.hortifruit[1]").unwrap();
        assert_eq!(missing.lookup(&body), None);
    }
}
