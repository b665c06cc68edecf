//! Command resolution for voice and keyboard input
//!
//! Speech recognizers mishear short words, so each command carries a fixed
//! table of "sounds like" aliases. Resolution is an exact lookup followed by
//! an alias lookup; nothing fuzzier than that.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Commands the loop engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Start the first capture of a performance
    Begin,
    /// Commit the running capture as a loop layer
    Loop,
    /// Reset everything back to an empty stage
    Blackout,
    /// Mirror the rendered clips
    Flip,
    /// Single-button control (click or space bar)
    Toggle,
}

impl Command {
    /// All commands, in canonical order
    pub const ALL: [Command; 5] = [
        Command::Begin,
        Command::Loop,
        Command::Blackout,
        Command::Flip,
        Command::Toggle,
    ];

    /// Canonical spoken name
    pub fn name(&self) -> &'static str {
        match self {
            Command::Begin => "begin",
            Command::Loop => "loop",
            Command::Blackout => "blackout",
            Command::Flip => "flip",
            Command::Toggle => "toggle",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Words the recognizer tends to hear instead of the real command
const SOUND_ALIKES: &[(&str, Command)] = &[
    ("luke", Command::Loop),
    ("flute", Command::Loop),
    ("woot", Command::Loop),
    ("blue", Command::Loop),
    ("bn", Command::Begin),
    ("being", Command::Begin),
    ("vegan", Command::Begin),
    ("mirror", Command::Flip),
];

/// Keyboard shortcuts
const KEY_BINDINGS: &[(&str, Command)] = &[
    (" ", Command::Toggle),
    ("m", Command::Flip),
    ("escape", Command::Blackout),
];

/// Maps free-text utterances onto [`Command`]s
///
/// Both tables are fixed once the resolver is built.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    canonical: HashMap<&'static str, Command>,
    aliases: HashMap<String, Command>,
}

impl Default for CommandResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandResolver {
    /// Resolver with the built-in sound-alike table
    pub fn new() -> Self {
        let canonical = Command::ALL.iter().map(|c| (c.name(), *c)).collect();
        let aliases = SOUND_ALIKES
            .iter()
            .map(|(alias, command)| (alias.to_string(), *command))
            .collect();
        Self { canonical, aliases }
    }

    /// Resolver with no aliases at all
    pub fn exact_only() -> Self {
        Self {
            aliases: HashMap::new(),
            ..Self::new()
        }
    }

    /// Add an extra alias at construction time
    pub fn with_alias(mut self, alias: &str, command: Command) -> Self {
        self.aliases.insert(normalize(alias), command);
        self
    }

    /// Resolve an utterance to a command
    ///
    /// # Example
    /// ```
    /// use layerloop::command::{Command, CommandResolver};
    ///
    /// let resolver = CommandResolver::new();
    /// assert_eq!(resolver.resolve(" Begin "), Some(Command::Begin));
    /// assert_eq!(resolver.resolve("flute"), Some(Command::Loop));
    /// assert_eq!(resolver.resolve("xyzzy"), None);
    /// ```
    pub fn resolve(&self, utterance: &str) -> Option<Command> {
        let cleaned = normalize(utterance);
        let resolved = self
            .canonical
            .get(cleaned.as_str())
            .or_else(|| self.aliases.get(&cleaned))
            .copied();

        if resolved.is_none() {
            debug!(utterance, "no command matched");
        }
        resolved
    }

    /// Resolve a keyboard key name (`" "`, `"m"`, `"Escape"`)
    pub fn resolve_key(&self, key: &str) -> Option<Command> {
        let key = if key == " " {
            key.to_string()
        } else {
            normalize(key)
        };
        KEY_BINDINGS
            .iter()
            .find(|(binding, _)| *binding == key)
            .map(|(_, command)| *command)
    }

    /// Number of aliases known to this resolver
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("begin", Some(Command::Begin) ; "exact begin")]
    #[test_case("Begin", Some(Command::Begin) ; "capitalised begin")]
    #[test_case("  LOOP\n", Some(Command::Loop) ; "padded loop")]
    #[test_case("blackout", Some(Command::Blackout) ; "exact blackout")]
    #[test_case("flip", Some(Command::Flip) ; "exact flip")]
    #[test_case("flute", Some(Command::Loop) ; "alias flute")]
    #[test_case("Luke", Some(Command::Loop) ; "alias luke")]
    #[test_case("vegan", Some(Command::Begin) ; "alias vegan")]
    #[test_case("mirror", Some(Command::Flip) ; "alias mirror")]
    #[test_case("xyzzy", None ; "unknown word")]
    #[test_case("", None ; "empty")]
    #[test_case("begin loop", None ; "no partial matching")]
    fn test_resolve(utterance: &str, expected: Option<Command>) {
        assert_eq!(CommandResolver::new().resolve(utterance), expected);
    }

    #[test]
    fn test_exact_only_ignores_aliases() {
        let resolver = CommandResolver::exact_only();
        assert_eq!(resolver.resolve("flute"), None);
        assert_eq!(resolver.resolve("loop"), Some(Command::Loop));
        assert_eq!(resolver.alias_count(), 0);
    }

    #[test]
    fn test_custom_alias() {
        let resolver = CommandResolver::new().with_alias("  Go ", Command::Begin);
        assert_eq!(resolver.resolve("go"), Some(Command::Begin));
        assert_eq!(resolver.alias_count(), SOUND_ALIKES.len() + 1);
    }

    #[test]
    fn test_key_bindings() {
        let resolver = CommandResolver::new();
        assert_eq!(resolver.resolve_key(" "), Some(Command::Toggle));
        assert_eq!(resolver.resolve_key("m"), Some(Command::Flip));
        assert_eq!(resolver.resolve_key("Escape"), Some(Command::Blackout));
        assert_eq!(resolver.resolve_key("q"), None);
    }

    #[test]
    fn test_command_display() {
        assert_eq!(Command::Blackout.to_string(), "blackout");
    }
}
