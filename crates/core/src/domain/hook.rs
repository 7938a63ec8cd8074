// Hook commands - user-configured commands run before/after a workflow

use serde::{Deserialize, Serialize};

/// One external command (argument vector, no shell interpretation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HookCommandRepr")]
pub struct HookCommand {
    pub command: String,
    pub args: Vec<String>,
}

impl HookCommand {
    pub fn new(command: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Accepted spellings: `"cmd"`, `["cmd"]`, `["cmd", ["a", "b"]]`,
/// `{ "command": "cmd", "args": [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum HookCommandRepr {
    Bare(String),
    Lone([String; 1]),
    Pair(String, Vec<String>),
    Full {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl From<HookCommandRepr> for HookCommand {
    fn from(repr: HookCommandRepr) -> Self {
        match repr {
            HookCommandRepr::Bare(command) => Self::new(command, Vec::<String>::new()),
            HookCommandRepr::Lone([command]) => Self::new(command, Vec::<String>::new()),
            HookCommandRepr::Pair(command, args) => Self { command, args },
            HookCommandRepr::Full { command, args } => Self { command, args },
        }
    }
}

/// Hook settings file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookSettings {
    #[serde(alias = "preCmds")]
    pub pre_cmds: Vec<HookCommand>,
    #[serde(alias = "postCmds")]
    pub post_cmds: Vec<HookCommand>,
}
