use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use globset::{Glob, GlobMatcher};
use regex::Regex;
use zvon_error::{BusError, StackError};

use super::intern_channel;
use crate::event::WILDCARD;

/// Имя канала.
///
/// Точное имя (`Exact`) идентифицирует канал, в который можно отправлять
/// события. Шаблоны (`Glob`, `Regex`) служат только фильтрами для
/// прослушивания: такой канал получает события всех точных каналов, чьё имя
/// подходит под шаблон, но сам отправлять не может.
#[derive(Clone)]
pub enum ChannelName {
    Exact(Arc<str>),
    Glob(GlobName),
    Regex(Regex),
}

/// Скомпилированный glob-шаблон имени.
#[derive(Clone, Debug)]
pub struct GlobName {
    glob: Glob,
    matcher: GlobMatcher,
}

impl GlobName {
    pub fn glob(&self) -> &Glob {
        &self.glob
    }
}

impl ChannelName {
    /// Имя wildcard-канала, который слышит все каналы.
    pub fn wildcard() -> Self {
        Self::Exact(intern_channel(WILDCARD))
    }

    /// Glob-шаблон, например `sensors.*`.
    pub fn glob(pattern: &str) -> Result<Self, StackError> {
        let glob = Glob::new(pattern)?;
        let matcher = glob.compile_matcher();
        Ok(Self::Glob(GlobName { glob, matcher }))
    }

    /// Регулярное выражение, например `^temp\.\d+$`.
    pub fn regex(pattern: &str) -> Result<Self, StackError> {
        let re = Regex::new(pattern).map_err(|e| BusError::InvalidChannelName {
            name: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::Regex(re))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Exact(name) if &**name == WILDCARD)
    }

    /// Шаблонные имена не могут быть источником событий.
    pub fn is_pattern(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    pub fn is_firable(&self) -> bool {
        !self.is_pattern()
    }

    /// Точное имя, если это не шаблон.
    pub fn as_exact(&self) -> Option<&str> {
        match self {
            Self::Exact(name) => Some(name),
            _ => None,
        }
    }

    /// Нечёткое сопоставление: подходит ли точное имя `other` под этот
    /// шаблон. Для точных имён всегда `false`.
    pub fn fuzzy_matches(
        &self,
        other: &ChannelName,
    ) -> bool {
        let Some(target) = other.as_exact() else {
            return false;
        };
        match self {
            Self::Exact(_) => false,
            Self::Glob(g) => g.matcher.is_match(target),
            Self::Regex(re) => re.is_match(target),
        }
    }

    fn key(&self) -> (u8, &str) {
        match self {
            Self::Exact(name) => (0, name),
            Self::Glob(g) => (1, g.glob.glob()),
            Self::Regex(re) => (2, re.as_str()),
        }
    }
}

impl PartialEq for ChannelName {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ChannelName {}

impl Hash for ChannelName {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.key().hash(state);
    }
}

impl PartialOrd for ChannelName {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChannelName {
    fn cmp(
        &self,
        other: &Self,
    ) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl From<&str> for ChannelName {
    fn from(name: &str) -> Self {
        Self::Exact(intern_channel(name))
    }
}

impl From<String> for ChannelName {
    fn from(name: String) -> Self {
        Self::Exact(intern_channel(name))
    }
}

impl From<&ChannelName> for ChannelName {
    fn from(name: &ChannelName) -> Self {
        name.clone()
    }
}

impl From<Regex> for ChannelName {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

impl From<Glob> for ChannelName {
    fn from(glob: Glob) -> Self {
        let matcher = glob.compile_matcher();
        Self::Glob(GlobName { glob, matcher })
    }
}

impl fmt::Display for ChannelName {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Exact(name) => f.write_str(name),
            Self::Glob(g) => write!(f, "glob:{}", g.glob.glob()),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl fmt::Debug for ChannelName {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "ChannelName({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет нечёткое сопоставление glob и regex с точными именами.
    #[test]
    fn test_fuzzy_matches() {
        let glob = ChannelName::glob("sensors.*").unwrap();
        let re = ChannelName::regex(r"^temp\.\d+$").unwrap();

        assert!(glob.fuzzy_matches(&"sensors.kitchen".into()));
        assert!(!glob.fuzzy_matches(&"alerts".into()));
        assert!(re.fuzzy_matches(&"temp.42".into()));
        assert!(!re.fuzzy_matches(&"temp.x".into()));
        assert!(!re.fuzzy_matches(&glob));

        let exact: ChannelName = "sensors.kitchen".into();
        assert!(!exact.fuzzy_matches(&exact));
    }

    /// Тест проверяет флаги wildcard/pattern.
    #[test]
    fn test_flags() {
        assert!(ChannelName::wildcard().is_wildcard());
        assert!(ChannelName::from("*").is_wildcard());
        assert!(!ChannelName::from("alerts").is_pattern());
        assert!(ChannelName::regex("a+").unwrap().is_pattern());
        assert!(!ChannelName::glob("a*").unwrap().is_firable());
    }

    /// Тест проверяет, что одинаковые шаблоны равны, а точное имя и шаблон с
    /// тем же текстом — нет.
    #[test]
    fn test_equality_by_kind_and_text() {
        assert_eq!(ChannelName::regex("a+").unwrap(), ChannelName::regex("a+").unwrap());
        assert_ne!(ChannelName::from("a*"), ChannelName::glob("a*").unwrap());
    }

    /// Тест проверяет ошибки компиляции шаблонов.
    #[test]
    fn test_invalid_patterns() {
        let err = ChannelName::regex("(").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BusError>(),
            Some(BusError::InvalidChannelName { .. })
        ));

        let err = ChannelName::glob("a[").unwrap_err();
        match err.downcast_ref::<BusError>() {
            Some(BusError::InvalidChannelName { name, .. }) => assert_eq!(name, "a["),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Тест проверяет текстовое представление.
    #[test]
    fn test_display() {
        assert_eq!(ChannelName::from("alerts").to_string(), "alerts");
        assert_eq!(ChannelName::glob("a.*").unwrap().to_string(), "glob:a.*");
        assert_eq!(ChannelName::regex("^a").unwrap().to_string(), "/^a/");
    }
}
