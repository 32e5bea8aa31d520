use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::adapters::{CommandOutput, CommandRunner};
use anyhow::Result;
use async_trait::async_trait;

/// Command runner that answers from a script instead of spawning processes.
///
/// Responses are keyed by the full command line (`"bluetoothctl info AA:..."`).
/// Queued responses are consumed in order; the last one repeats. Unscripted
/// commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    inner: Mutex<Script>,
}

#[derive(Default)]
struct Script {
    responses: HashMap<String, VecDeque<CommandOutput>>,
    calls: Vec<String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `command`.
    pub fn on(&self, command: &str, output: CommandOutput) -> &Self {
        self.lock()
            .responses
            .entry(command.to_string())
            .or_default()
            .push_back(output);
        self
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn was_called(&self, command: &str) -> bool {
        self.lock().calls.iter().any(|c| c == command)
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");

        let mut script = self.lock();
        script.calls.push(line.clone());

        let output = match script.responses.get_mut(&line) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => CommandOutput::ok(""),
        };
        Ok(output)
    }
}
