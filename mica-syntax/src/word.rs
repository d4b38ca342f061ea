//! Word interning for identifier handling
//!
//! Identifiers occur many times across trees, symbols and modules, so they
//! are interned once into a global table and handled as copyable ids.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// Interned identifier word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Word(u32);

impl Word {
    /// Intern a string and return its word
    pub fn intern(s: &str) -> Self {
        interner().with_mut(|i| i.intern(s))
    }

    /// Get the string representation of this word
    pub fn as_str(self) -> &'static str {
        interner().with(|i| i.resolve(self))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Word {
    fn from(s: &str) -> Self {
        Word::intern(s)
    }
}

impl From<String> for Word {
    fn from(s: String) -> Self {
        Word::intern(&s)
    }
}

struct WordInterner {
    words: Vec<&'static str>,
    indices: HashMap<&'static str, u32>,
}

impl WordInterner {
    fn new() -> Self {
        WordInterner { words: Vec::new(), indices: HashMap::new() }
    }

    fn intern(&mut self, s: &str) -> Word {
        if let Some(&index) = self.indices.get(s) {
            return Word(index);
        }
        // Interned words live for the whole compilation, so leaking the
        // backing string gives out 'static references safely.
        let leaked: &'static str = Box::leak(s.to_string().into_boxed_str());
        let index = self.words.len() as u32;
        self.words.push(leaked);
        self.indices.insert(leaked, index);
        Word(index)
    }

    fn resolve(&self, word: Word) -> &'static str {
        self.words[word.0 as usize]
    }
}

struct GlobalInterner {
    inner: Mutex<WordInterner>,
}

impl GlobalInterner {
    fn with_mut<R>(&self, f: impl FnOnce(&mut WordInterner) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    fn with<R>(&self, f: impl FnOnce(&WordInterner) -> R) -> R {
        f(&self.inner.lock().unwrap())
    }
}

static INTERNER: OnceLock<GlobalInterner> = OnceLock::new();

fn interner() -> &'static GlobalInterner {
    INTERNER.get_or_init(|| GlobalInterner { inner: Mutex::new(WordInterner::new()) })
}

/// Commonly used words, pre-interned
pub mod words {
    use super::Word;
    use std::sync::OnceLock;

    macro_rules! define_words {
        ($($name:ident = $value:literal),* $(,)?) => {
            $(
                pub fn $name() -> Word {
                    static WORD: OnceLock<Word> = OnceLock::new();
                    *WORD.get_or_init(|| Word::intern($value))
                }
            )*
        };
    }

    define_words! {
        UNDERSCORE = "_",
        MAIN = "main",
        RESUME = "resume",

        // Builtin value types
        INT = "Int",
        DOUBLE = "Double",
        BOOL = "Bool",
        STRING = "String",
        UNIT = "Unit",

        // The cell interface backing mutable variables
        CELL = "Cell",
        GET = "get",
        PUT = "put",

        // Distinguished capabilities
        IO = "io",
        CONTROL = "control",

        // Well-known standard modules
        PRELUDE = "prelude",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_stable() {
        let a = Word::intern("hello");
        let b = Word::intern("hello");
        let c = Word::intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "hello");
        assert_eq!(c.as_str(), "world");
    }

    #[test]
    fn test_predefined_words() {
        assert_eq!(words::INT().as_str(), "Int");
        assert_eq!(words::RESUME().as_str(), "resume");
        assert_eq!(words::GET(), Word::intern("get"));
    }
}
