//! Watch rules: one container binds a path to events and a reaction.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::RuleError;
use super::event::Event;

/// Whether a rule targets a single file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    File,
    #[default]
    Dir,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::File => f.write_str("file"),
            TargetKind::Dir => f.write_str("dir"),
        }
    }
}

/// Reaction command as written in the rule file.
///
/// A string is split with POSIX shell quoting rules; a list is used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandTemplate {
    Line(String),
    Argv(Vec<String>),
}

impl CommandTemplate {
    /// Resolve the template into program + arguments.
    pub fn argv(&self) -> Result<Vec<String>, String> {
        let argv = match self {
            CommandTemplate::Line(line) => {
                shlex::split(line).ok_or_else(|| format!("unbalanced quoting in '{line}'"))?
            }
            CommandTemplate::Argv(argv) => argv.clone(),
        };

        match argv.first() {
            Some(program) if !program.trim().is_empty() => Ok(argv),
            _ => Err("no program given".to_string()),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            CommandTemplate::Line(line) => line.trim().is_empty(),
            CommandTemplate::Argv(argv) => argv.is_empty(),
        }
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTemplate::Line(line) => f.write_str(line),
            CommandTemplate::Argv(argv) => write!(f, "{argv:?}"),
        }
    }
}

/// Arguments handed to a triggered reaction: `(event, path, args)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallArgs {
    pub on: Event,
    pub path: String,
    pub args: String,
}

impl CallArgs {
    pub fn new(on: Event, path: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            on,
            path: path.into(),
            args: args.into(),
        }
    }

    /// The three trailing positional arguments of a reaction command.
    pub fn positional(&self) -> [String; 3] {
        [
            self.on.as_str().to_string(),
            self.path.clone(),
            self.args.clone(),
        ]
    }
}

/// A declarative watch rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Target path
    pub path: String,

    /// File or directory target
    #[serde(default)]
    pub kind: TargetKind,

    /// Subscribed events
    #[serde(default = "default_events")]
    pub on: Vec<Event>,

    /// Watch subdirectories too
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Extensions whose paths never trigger this rule
    #[serde(default)]
    pub excluded_extensions: Vec<String>,

    /// Command run on a match; receives event, path and args as trailing arguments
    pub cmd: CommandTemplate,

    /// Free-form argument string passed as the third positional argument
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub args: String,
}

fn default_events() -> Vec<Event> {
    vec![Event::FileCreated]
}

fn default_true() -> bool {
    true
}

impl Container {
    /// Create a directory rule reacting to `fileCreated`.
    pub fn new(path: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: TargetKind::Dir,
            on: default_events(),
            recursive: true,
            excluded_extensions: Vec::new(),
            cmd: CommandTemplate::Line(cmd.into()),
            args: String::new(),
        }
    }

    pub fn with_kind(mut self, kind: TargetKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_events(mut self, on: impl IntoIterator<Item = Event>) -> Self {
        self.on = on.into_iter().collect();
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn exclude_extension(mut self, ext: impl Into<String>) -> Self {
        self.excluded_extensions.push(ext.into());
        self
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn is_file_type(&self) -> bool {
        self.kind == TargetKind::File
    }

    /// Decide whether this rule reacts to a normalized event.
    ///
    /// A file target ignores every structural event of its parent
    /// directory, even when one is listed in `on`.
    pub fn should_react(&self, event: Option<Event>) -> bool {
        let Some(event) = event else {
            return false;
        };

        if self.is_file_type() && event.is_directory_scoped() {
            return false;
        }

        self.on.contains(&event)
    }

    /// Same predicate for a textual event name. Unknown names never match.
    pub fn should_react_name(&self, name: &str) -> bool {
        self.should_react(name.parse().ok())
    }

    /// Whether `path` carries one of the excluded extensions.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };

        self.excluded_extensions
            .iter()
            .map(|excluded| excluded.trim().trim_start_matches('.'))
            .any(|excluded| excluded.eq_ignore_ascii_case(ext))
    }

    /// Build the reaction arguments for a matched event.
    pub fn call_args(&self, event: Event, path: &Path) -> CallArgs {
        CallArgs::new(event, path.display().to_string(), self.args.clone())
    }

    /// Check the rule invariants. `index` is the position in the rule set.
    pub fn validate(&self, index: usize) -> Result<(), RuleError> {
        if self.path.trim().is_empty() {
            return Err(RuleError::EmptyPath { index });
        }

        if self.on.is_empty() {
            return Err(RuleError::NoEvents {
                index,
                path: self.path.clone(),
            });
        }

        if self.cmd.is_blank() {
            return Err(RuleError::EmptyCommand {
                index,
                path: self.path.clone(),
            });
        }

        self.cmd
            .argv()
            .map(|_| ())
            .map_err(|reason| RuleError::InvalidCommand {
                index,
                path: self.path.clone(),
                reason,
            })
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events: Vec<&str> = self.on.iter().map(Event::as_str).collect();
        write!(
            f,
            "{:?}, kind: {}, on: [{}], recursive: {}",
            self.path,
            self.kind,
            events.join(", "),
            self.recursive
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file_rule(on: &[Event]) -> Container {
        Container::new("/tmp/x", "echo")
            .with_kind(TargetKind::File)
            .with_events(on.iter().copied())
    }

    #[test]
    fn test_file_rule_reacts_to_file_modification() {
        let rule = file_rule(&[Event::FileModified]);
        assert!(rule.should_react(crate::rules::normalize_name("modified", false)));
        assert!(!rule.should_react(crate::rules::normalize_name("modified", true)));
    }

    #[test]
    fn test_file_rule_never_reacts_to_directory_events() {
        let rule = file_rule(&Event::ALL);
        for event in Event::ALL {
            assert_eq!(
                rule.should_react(Some(event)),
                !event.is_directory_scoped(),
                "{event}"
            );
        }
    }

    #[test]
    fn test_dir_rule_membership() {
        let rule = Container::new("/srv", "echo")
            .with_events([Event::DirCreated, Event::FileDeleted]);
        for event in Event::ALL {
            let expected = matches!(event, Event::DirCreated | Event::FileDeleted);
            assert_eq!(rule.should_react(Some(event)), expected, "{event}");
        }
        assert!(!rule.should_react(None));
    }

    #[test]
    fn test_should_react_name_ignores_case() {
        let rule = Container::new("/srv", "echo").with_events([Event::FileModified]);
        assert!(rule.should_react_name("FILEMODIFIED"));
        assert!(rule.should_react_name("filemodified"));
        assert!(!rule.should_react_name("fileCreated"));
        assert!(!rule.should_react_name("nonsense"));
    }

    #[test]
    fn test_excluded_extensions() {
        let rule = Container::new("/srv", "echo")
            .exclude_extension(".tmp")
            .exclude_extension("SWP");

        assert!(rule.is_excluded(&PathBuf::from("/srv/a.tmp")));
        assert!(rule.is_excluded(&PathBuf::from("/srv/.a.swp")));
        assert!(!rule.is_excluded(&PathBuf::from("/srv/a.rs")));
        assert!(!rule.is_excluded(&PathBuf::from("/srv/Makefile")));
    }

    #[test]
    fn test_command_template_quoting() {
        let cmd = CommandTemplate::Line("notify-send 'file changed' --urgency=low".to_string());
        assert_eq!(
            cmd.argv().unwrap(),
            vec!["notify-send", "file changed", "--urgency=low"]
        );

        let argv = CommandTemplate::Argv(vec!["/opt/my tool/run".to_string()]);
        assert_eq!(argv.argv().unwrap(), vec!["/opt/my tool/run"]);

        assert!(CommandTemplate::Line("echo 'oops".to_string()).argv().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(Container::new("/srv", "echo").validate(0).is_ok());

        let no_events = Container::new("/srv", "echo").with_events([]);
        assert!(matches!(
            no_events.validate(3),
            Err(RuleError::NoEvents { index: 3, .. })
        ));

        assert!(matches!(
            Container::new(" ", "echo").validate(0),
            Err(RuleError::EmptyPath { index: 0 })
        ));
        assert!(matches!(
            Container::new("/srv", "  ").validate(1),
            Err(RuleError::EmptyCommand { index: 1, .. })
        ));
    }

    #[test]
    fn test_call_args() {
        let rule = Container::new("/srv", "echo").with_args("--verbose");
        let call = rule.call_args(Event::FileCreated, Path::new("/srv/new.txt"));
        assert_eq!(
            call.positional(),
            [
                "fileCreated".to_string(),
                "/srv/new.txt".to_string(),
                "--verbose".to_string()
            ]
        );
    }
}
