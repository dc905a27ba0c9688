//! Компактная запись событий и нормализация входных форм.
//!
//! Поддерживаемые формы:
//! - голый тип: `ping`, `*`;
//! - тип с аргументами: `temp[72, threshold: 90]`, `dog["rex", 3.5, ok: true]`;
//! - готовое [`Event`];
//! - ассоциативная форма «тип → аргументы»;
//! - список из любых форм (разворачивается рекурсивно).
//!
//! Значения аргументов — JSON-литералы; голое слово (`rex`, `12:30`,
//! `http://host/x`) считается строкой, `nil` — это `null`.
//!
//! `ключ:` начинает именованный аргумент, только если после двоеточия идёт
//! пробел или литерал (`threshold: 90`, `threshold:90`, `name:"x"`). Иначе
//! двоеточие остаётся частью голого слова: `at[12:30]` и `url[http://x]`
//! дают по одному позиционному аргументу. Строку вида `a: b` позиционно
//! передают в кавычках.

use std::collections::BTreeMap;

use zvon_error::PatternError;

use super::{Event, Kwargs, Value};

/// Входная форма для `register`, `fire` и планировщика.
#[derive(Debug, Clone)]
pub enum EventSpec {
    /// Строка в компактной записи.
    Notation(String),
    /// Готовое событие.
    Event(Event),
    /// Ассоциативная форма: одно событие на каждый ключ.
    Map(Vec<(String, Vec<Value>, Kwargs)>),
    /// Список форм.
    List(Vec<EventSpec>),
}

impl EventSpec {
    /// Разворачивает форму в плоский список событий.
    pub fn into_events(self) -> Result<Vec<Event>, PatternError> {
        let mut out = Vec::new();
        self.collect_into(&mut out)?;
        Ok(out)
    }

    fn collect_into(
        self,
        out: &mut Vec<Event>,
    ) -> Result<(), PatternError> {
        match self {
            Self::Notation(s) => out.push(parse(&s)?),
            Self::Event(e) => out.push(e),
            Self::Map(entries) => {
                for (kind, args, kwargs) in entries {
                    let kind = kind.trim().to_string();
                    if !is_type_name(&kind) {
                        return Err(PatternError::new(kind, 0, "invalid event type"));
                    }
                    out.push(Event::with_payload(kind, args, kwargs));
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_into(out)?;
                }
            }
        }
        Ok(())
    }
}

impl From<&str> for EventSpec {
    fn from(s: &str) -> Self {
        Self::Notation(s.to_string())
    }
}

impl From<String> for EventSpec {
    fn from(s: String) -> Self {
        Self::Notation(s)
    }
}

impl From<Event> for EventSpec {
    fn from(e: Event) -> Self {
        Self::Event(e)
    }
}

impl From<&Event> for EventSpec {
    fn from(e: &Event) -> Self {
        Self::Event(e.clone())
    }
}

impl<T: Into<EventSpec>> From<Vec<T>> for EventSpec {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<EventSpec>, const N: usize> From<[T; N]> for EventSpec {
    fn from(items: [T; N]) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Vec<Value>>> for EventSpec {
    fn from(map: BTreeMap<String, Vec<Value>>) -> Self {
        Self::Map(
            map.into_iter()
                .map(|(kind, args)| (kind, args, Kwargs::new()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, Kwargs>> for EventSpec {
    fn from(map: BTreeMap<String, Kwargs>) -> Self {
        Self::Map(
            map.into_iter()
                .map(|(kind, kwargs)| (kind, Vec::new(), kwargs))
                .collect(),
        )
    }
}

/// Разбирает одну компактную запись.
pub fn parse(input: &str) -> Result<Event, PatternError> {
    let trimmed = input.trim();
    let lead = input.len() - input.trim_start().len();

    let Some(open) = trimmed.find('[') else {
        if !is_type_name(trimmed) {
            return Err(PatternError::new(input, lead, "invalid event type"));
        }
        return Ok(Event::new(trimmed));
    };

    let kind = trimmed[..open].trim();
    if !is_type_name(kind) {
        return Err(PatternError::new(input, lead, "invalid event type"));
    }
    if !trimmed.ends_with(']') {
        return Err(PatternError::new(input, lead + trimmed.len(), "unclosed '['"));
    }

    let body_start = lead + open + 1;
    let body = &trimmed[open + 1..trimmed.len() - 1];
    let mut args = Vec::new();
    let mut kwargs = Kwargs::new();

    if body.trim().is_empty() {
        return Ok(Event::with_payload(kind, args, kwargs));
    }

    for (offset, piece) in split_top_level(body, ',').map_err(|(pos, reason)| {
        PatternError::new(input, body_start + pos, reason)
    })? {
        let at = body_start + offset;
        let item = piece.trim();
        if item.is_empty() {
            return Err(PatternError::new(input, at, "empty argument"));
        }

        match split_key(item) {
            Some((key, value)) => {
                let value = parse_value(value)
                    .ok_or_else(|| PatternError::new(input, at, "invalid value"))?;
                if kwargs.insert(key, value).is_some() {
                    return Err(PatternError::new(input, at, "duplicate keyword"));
                }
            }
            None => {
                if !kwargs.is_empty() {
                    return Err(PatternError::new(
                        input,
                        at,
                        "positional argument after keyword argument",
                    ));
                }
                let value =
                    parse_value(item).ok_or_else(|| PatternError::new(input, at, "invalid value"))?;
                args.push(value);
            }
        }
    }

    Ok(Event::with_payload(kind, args, kwargs))
}

fn is_type_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | '*' | '?'))
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Делит строку по разделителю верхнего уровня (вне кавычек и скобок).
/// Возвращает смещение и текст каждого куска.
fn split_top_level(
    s: &str,
    sep: char,
) -> Result<Vec<(usize, &str)>, (usize, &'static str)> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if in_str {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_str = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1).ok_or((i, "unbalanced bracket"))?;
            }
            _ if c == sep && depth == 0 => {
                parts.push((start, &s[start..i]));
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if in_str {
        return Err((s.len(), "unterminated string"));
    }
    if depth != 0 {
        return Err((s.len(), "unbalanced bracket"));
    }
    parts.push((start, &s[start..]));
    Ok(parts)
}

/// Выделяет `ключ: значение`, если кусок начинается с идентификатора или
/// строки в кавычках, за которыми идёт `:`, а после двоеточия пробел,
/// конец куска или литерал.
fn split_key(item: &str) -> Option<(String, &str)> {
    let pieces = split_top_level(item, ':').ok()?;
    if pieces.len() < 2 {
        return None;
    }
    let (_, raw_key) = pieces[0];
    let value_start = raw_key.len() + 1;
    let raw_key = raw_key.trim();

    let key = if is_ident(raw_key) {
        raw_key.to_string()
    } else if raw_key.starts_with('"') {
        match serde_json::from_str::<Value>(raw_key).ok()? {
            Value::String(s) => s,
            _ => return None,
        }
    } else {
        return None;
    };

    let rest = &item[value_start..];
    let spaced = rest.is_empty() || rest.starts_with(char::is_whitespace);
    if !spaced && !is_literal(rest) {
        return None;
    }

    Some((key, rest.trim()))
}

fn is_literal(raw: &str) -> bool {
    let raw = raw.trim();
    raw == "nil" || serde_json::from_str::<Value>(raw).is_ok()
}

fn is_bare_word(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | '*' | '?' | ':'))
}

fn parse_value(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw == "nil" {
        return Some(Value::Null);
    }
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return Some(v);
    }
    is_bare_word(raw).then(|| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Тест проверяет голый тип.
    #[test]
    fn test_bare_tag() {
        let ev = parse("ping").unwrap();
        assert_eq!(ev.event_type().as_str(), "ping");
        assert!(ev.args().is_empty());
        assert!(ev.kwargs().is_empty());

        assert!(parse(" * ").unwrap().event_type().is_any());
    }

    /// Тест проверяет позиционные и именованные аргументы.
    #[test]
    fn test_tag_with_args() {
        let ev = parse("temp[72, threshold: 90]").unwrap();
        assert_eq!(ev.event_type().as_str(), "temp");
        assert_eq!(ev.args(), &[json!(72)]);
        assert_eq!(ev.get("threshold"), Some(&json!(90)));
    }

    /// Тест проверяет разные литералы: строки, вложенные массивы, объекты,
    /// голые слова и `nil`.
    #[test]
    fn test_literals() {
        let ev = parse(r#"dog["a, b", [1, 2], {"k": "v:w"}, rex, nil, name: "x:y", ok: true]"#)
            .unwrap();
        assert_eq!(
            ev.args(),
            &[
                json!("a, b"),
                json!([1, 2]),
                json!({"k": "v:w"}),
                json!("rex"),
                Value::Null
            ]
        );
        assert_eq!(ev.get("name"), Some(&json!("x:y")));
        assert_eq!(ev.get("ok"), Some(&json!(true)));
    }

    /// Тест проверяет голые слова с двоеточием: они остаются позиционными,
    /// пока после двоеточия нет пробела или литерала.
    #[test]
    fn test_colon_inside_bare_words() {
        let ev = parse("url[http://x]").unwrap();
        assert_eq!(ev.args(), &[json!("http://x")]);
        assert!(ev.kwargs().is_empty());

        let ev = parse("at[12:30]").unwrap();
        assert_eq!(ev.args(), &[json!("12:30")]);

        let ev = parse("route[a:b, limit:5]").unwrap();
        assert_eq!(ev.args(), &[json!("a:b")]);
        assert_eq!(ev.get("limit"), Some(&json!(5)));

        let ev = parse(r#"temp[threshold:90, label:"hot", unit: c, gone:nil]"#).unwrap();
        assert!(ev.args().is_empty());
        assert_eq!(ev.get("threshold"), Some(&json!(90)));
        assert_eq!(ev.get("label"), Some(&json!("hot")));
        assert_eq!(ev.get("unit"), Some(&json!("c")));
        assert_eq!(ev.get("gone"), Some(&Value::Null));

        assert_eq!(parse("x[a:]").unwrap_err().reason, "invalid value");
    }

    /// Тест проверяет пустые скобки и ключ в кавычках.
    #[test]
    fn test_empty_brackets_and_quoted_key() {
        assert!(parse("x[]").unwrap().args().is_empty());
        let ev = parse(r#"x["full name": "Rex"]"#).unwrap();
        assert_eq!(ev.get("full name"), Some(&json!("Rex")));
    }

    /// Тест проверяет ошибки разбора.
    #[test]
    fn test_malformed() {
        let err = parse("dog[55").unwrap_err();
        assert_eq!(err.reason, "unclosed '['");

        assert_eq!(parse("dog[1,,2]").unwrap_err().reason, "empty argument");
        assert_eq!(parse("[1]").unwrap_err().reason, "invalid event type");
        assert_eq!(parse("dog[\"x]").unwrap_err().reason, "unterminated string");
        assert_eq!(parse("dog[a: 1, a: 2]").unwrap_err().reason, "duplicate keyword");
        assert_eq!(
            parse("dog[a: 1, 2]").unwrap_err().reason,
            "positional argument after keyword argument"
        );
        assert_eq!(parse("dog[@@]").unwrap_err().reason, "invalid value");
        assert!(parse("").is_err());
    }

    /// Тест проверяет нормализацию смешанного списка и ассоциативной формы.
    #[test]
    fn test_list_from_mixed_forms() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), vec![json!(1)]);
        map.insert("b".to_string(), vec![]);

        let spec = EventSpec::List(vec![
            "x".into(),
            Event::new("y").arg(2).into(),
            map.into(),
            vec!["z[3]", "w"].into(),
        ]);

        let events = spec.into_events().unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type().as_str()).collect();
        assert_eq!(kinds, ["x", "y", "a", "b", "z", "w"]);
        assert_eq!(events[2].args(), &[json!(1)]);
        assert_eq!(events[4].args(), &[json!(3)]);
    }

    /// Тест проверяет ассоциативную форму с именованными аргументами.
    #[test]
    fn test_map_with_kwargs() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("threshold".to_string(), json!(90));
        let mut map = BTreeMap::new();
        map.insert("temp".to_string(), kwargs);

        let events = Event::list_from(map).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("threshold"), Some(&json!(90)));
    }

    /// Тест проверяет, что ошибка во вложенном элементе списка всплывает.
    #[test]
    fn test_list_propagates_error() {
        assert!(Event::list_from(vec!["ok", "bad["]).is_err());
    }
}
