//! In-process stand-ins for the two serial controllers.

use crate::errors::{Result, RigError};
use crate::motion::{AxisPosition, MotionMode};
use crate::serial::SerialLink;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

const HALT_LINE: &str = "Error:Printer halted. kill() called!";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct PrinterState {
    position: AxisPosition,
    relative: bool,
    feedrate: Option<f64>,
    display: Option<String>,
    sent: Vec<String>,
    pending: VecDeque<String>,
    halt_on: Option<String>,
    mute_on: Option<String>,
    halted: bool,
}

impl PrinterState {
    fn apply(&mut self, line: &str) {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("G90") => self.relative = false,
            Some("G91") => self.relative = true,
            Some("G28") => {
                self.position = AxisPosition::default();
                self.pending.push_back("echo:busy: processing".to_string());
            }
            Some("G0") | Some("G1") => {
                for word in words {
                    let (letter, value) = word.split_at(1);
                    let Ok(value) = value.parse::<f64>() else {
                        continue;
                    };
                    let axis = match letter {
                        "X" => &mut self.position.x,
                        "Y" => &mut self.position.y,
                        "Z" => &mut self.position.z,
                        "F" => {
                            self.feedrate = Some(value);
                            continue;
                        }
                        _ => continue,
                    };
                    if self.relative {
                        *axis += value;
                    } else {
                        *axis = value;
                    }
                }
            }
            Some("M117") => {
                self.display = Some(line.trim_start_matches("M117").trim().to_string());
            }
            _ => {}
        }
        self.pending.push_back("ok".to_string());
    }
}

/// A G-code motion controller living in memory.
///
/// Clones share the same simulated machine, so a test can keep one clone
/// to inspect what a [`crate::motion::MotionState`] sent through another.
#[derive(Debug, Clone)]
pub struct SimulatedPrinter {
    name: String,
    state: Arc<Mutex<PrinterState>>,
}

impl Default for SimulatedPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPrinter {
    pub fn new() -> Self {
        Self::named("sim-printer")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(PrinterState::default())),
        }
    }

    /// Every line written so far.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.state).sent.clone()
    }

    pub fn clear_sent(&self) {
        lock(&self.state).sent.clear();
    }

    pub fn position(&self) -> AxisPosition {
        lock(&self.state).position
    }

    pub fn feedrate(&self) -> Option<f64> {
        lock(&self.state).feedrate
    }

    pub fn mode(&self) -> MotionMode {
        if lock(&self.state).relative {
            MotionMode::Relative
        } else {
            MotionMode::Absolute
        }
    }

    pub fn display_text(&self) -> Option<String> {
        lock(&self.state).display.clone()
    }

    /// Halt when a command starting with `prefix` arrives. Every later
    /// command is answered with the halt report too.
    pub fn halt_on(&self, prefix: impl Into<String>) {
        lock(&self.state).halt_on = Some(prefix.into());
    }

    /// Never answer commands starting with `prefix`.
    pub fn mute_on(&self, prefix: impl Into<String>) {
        lock(&self.state).mute_on = Some(prefix.into());
    }

    pub fn clear_faults(&self) {
        let mut state = lock(&self.state);
        state.halt_on = None;
        state.mute_on = None;
        state.halted = false;
    }
}

impl SerialLink for SimulatedPrinter {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.sent.push(line.to_string());

        let matches = |prefix: &Option<String>| prefix.as_deref().is_some_and(|p| line.starts_with(p));
        if state.halted || matches(&state.halt_on) {
            state.halted = true;
            state.pending.push_back(HALT_LINE.to_string());
            return Ok(());
        }
        if matches(&state.mute_on) {
            return Ok(());
        }

        state.apply(line);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        lock(&self.state)
            .pending
            .pop_front()
            .ok_or_else(|| RigError::ProtocolTimeout {
                device: self.name.clone(),
                timeout: Duration::ZERO,
            })
    }

    fn clear_input(&mut self) -> Result<()> {
        lock(&self.state).pending.clear();
        Ok(())
    }
}

type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

#[derive(Default)]
struct ScriptState {
    responder: Option<Responder>,
    pending: VecDeque<String>,
    sent: Vec<String>,
    clears: usize,
}

/// A link answering each written line with whatever a closure returns.
/// Used for the lighting controller and for protocol tests.
#[derive(Clone)]
pub struct ScriptedLink {
    name: String,
    timeout: Duration,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedLink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: Duration::from_millis(10),
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    pub fn respond_with<F>(self, responder: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        lock(&self.state).responder = Some(Box::new(responder));
        self
    }

    /// How long a read waits on an empty line queue before timing out.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Queue a line as if the device had sent it unprompted.
    pub fn inject_line(&self, line: impl Into<String>) {
        lock(&self.state).pending.push_back(line.into());
    }

    pub fn sent(&self) -> Vec<String> {
        lock(&self.state).sent.clone()
    }

    pub fn clear_count(&self) -> usize {
        lock(&self.state).clears
    }
}

impl SerialLink for ScriptedLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.sent.push(line.to_string());
        let replies = match state.responder.as_mut() {
            Some(responder) => responder(line),
            None => Vec::new(),
        };
        state.pending.extend(replies);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        if let Some(line) = lock(&self.state).pending.pop_front() {
            return Ok(line);
        }
        thread::sleep(self.timeout);
        Err(RigError::ProtocolTimeout {
            device: self.name.clone(),
            timeout: self.timeout,
        })
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.pending.clear();
        state.clears += 1;
        Ok(())
    }
}
