//! The merge prompt abstraction.
//!
//! The engine talks to a [`Prompter`]: the interactive implementation is
//! dialoguer-backed with history, prefix completion, and validation; the
//! scripted implementation feeds canned answers for tests and drivers.

use std::collections::VecDeque;

use dialoguer::{theme::ColorfulTheme, Completion, History, Input};

use crate::{ArgSpec, MergeError, MergeResult};

/// One selectable action.
#[derive(Clone, Debug)]
pub struct MenuEntry {
    pub key: String,
    pub label: String,
}

/// The rendered prompt for one parameter.
#[derive(Clone, Debug)]
pub struct ActionMenu {
    /// Parameter name plus state description.
    pub title: String,
    pub entries: Vec<MenuEntry>,
    /// Bottom context line: parameter and model path.
    pub footer: String,
}

impl ActionMenu {
    /// The keys input is validated against.
    pub fn allowed_keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }
}

/// Interaction surface of the merge engine.
pub trait Prompter {
    /// Pick an action key from the menu. Implementations must only return
    /// keys in the menu's allowed set.
    fn select_action(&mut self, menu: &ActionMenu) -> MergeResult<String>;

    /// Ask for one action argument.
    fn prompt_argument(&mut self, arg: &ArgSpec) -> MergeResult<String>;
}

/// Interactive prompter with per-session history.
#[derive(Debug, Default)]
pub struct DialoguerPrompter {
    history: SessionHistory,
}

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// History that only suggests entries valid for the current menu.
#[derive(Debug, Default)]
struct SessionHistory {
    entries: Vec<String>,
    valid: Vec<String>,
}

impl History<String> for SessionHistory {
    fn read(&self, pos: usize) -> Option<String> {
        self.entries
            .iter()
            .rev()
            .filter(|entry| self.valid.contains(entry))
            .nth(pos)
            .cloned()
    }

    fn write(&mut self, val: &String) {
        self.entries.push(val.clone());
    }
}

/// Prefix completion over the allowed keys.
struct KeyCompletion {
    keys: Vec<String>,
}

impl Completion for KeyCompletion {
    fn get(&self, input: &str) -> Option<String> {
        let matches: Vec<&String> = self
            .keys
            .iter()
            .filter(|key| key.starts_with(input))
            .collect();
        match matches.as_slice() {
            [single] => Some((*single).clone()),
            _ => None,
        }
    }
}

impl Prompter for DialoguerPrompter {
    fn select_action(&mut self, menu: &ActionMenu) -> MergeResult<String> {
        println!("{}", menu.title);
        println!("Actions:");
        let widest = menu
            .entries
            .iter()
            .map(|e| e.key.len())
            .max()
            .unwrap_or(0);
        for entry in &menu.entries {
            println!("  {:>widest$})  {}", entry.key, entry.label);
        }

        let allowed = menu.allowed_keys();
        let completion = KeyCompletion {
            keys: allowed.clone(),
        };
        self.history.valid = allowed.clone();
        let footer = menu.footer.clone();

        let input = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("𝜃 [{footer}]"))
            .history_with(&mut self.history)
            .completion_with(&completion)
            .validate_with(move |text: &String| -> Result<(), String> {
                let text = text.trim();
                if allowed.iter().any(|key| key == text) {
                    return Ok(());
                }
                // A prefix of a valid action blocks submission without
                // shouting at the user mid-keystroke.
                if allowed.iter().any(|key| key.starts_with(text)) {
                    return Err(String::new());
                }
                Err("This input is not an allowed action.".to_owned())
            })
            .interact_text()
            .map_err(|e| MergeError::Prompt(e.to_string()))?;
        Ok(input.trim().to_owned())
    }

    fn prompt_argument(&mut self, arg: &ArgSpec) -> MergeResult<String> {
        println!("{}", arg.description);
        let validate = arg.validate;
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(arg.name)
            .validate_with(move |text: &String| validate(text))
            .interact_text()
            .map_err(|e| MergeError::Prompt(e.to_string()))
    }
}

/// Canned answers for tests and non-interactive drivers.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.answers.is_empty()
    }
}

impl Prompter for ScriptedPrompter {
    fn select_action(&mut self, menu: &ActionMenu) -> MergeResult<String> {
        let answer = self
            .answers
            .pop_front()
            .ok_or_else(|| MergeError::Prompt("scripted prompter ran out of answers".to_owned()))?;
        if !menu.allowed_keys().contains(&answer) {
            return Err(MergeError::UnknownAction(answer));
        }
        Ok(answer)
    }

    fn prompt_argument(&mut self, _arg: &ArgSpec) -> MergeResult<String> {
        self.answers
            .pop_front()
            .ok_or_else(|| MergeError::Prompt("scripted prompter ran out of answers".to_owned()))
    }
}
