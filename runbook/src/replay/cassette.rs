//! Cassette state shared by every boundary wrapper of one session
//!
//! Record mode appends events and persists after every boundary crossing, so
//! a crash still leaves a usable cassette. Replay mode loads the file once
//! and hands events out strictly in recorded order; nothing is ever skipped
//! or reordered.

use super::config::ReplayMode;
use super::events::{CassetteFile, Event, InitialState};
use super::{ReplayError, ReplayResult};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// On-disk cassette plus the in-memory cursor over its events
#[derive(Debug)]
pub struct Cassette {
    path: PathBuf,
    mode: ReplayMode,
    initial_state: InitialState,
    events: Vec<Event>,
    replay_index: usize,
    saved_count: usize,
}

impl Cassette {
    /// Open a cassette for recording
    ///
    /// Nothing touches the disk until the first [`Cassette::save`]; a run
    /// that records no events leaves no file behind.
    pub fn record(path: impl Into<PathBuf>, initial_state: InitialState) -> Self {
        Self {
            path: path.into(),
            mode: ReplayMode::Record,
            initial_state,
            events: Vec::new(),
            replay_index: 0,
            saved_count: 0,
        }
    }

    /// Load a cassette for replay
    ///
    /// The initial state comes from the file; the caller supplies none.
    pub fn replay(path: impl Into<PathBuf>) -> ReplayResult<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)?;
        let file: CassetteFile = serde_yaml::from_str(&text)?;
        let saved_count = file.events.len();
        tracing::debug!(
            "Loaded cassette {} with {} events",
            path.display(),
            saved_count
        );
        Ok(Self {
            path,
            mode: ReplayMode::Replay,
            initial_state: file.initial_state,
            events: file.events,
            replay_index: 0,
            saved_count,
        })
    }

    /// Which mode this cassette was opened in
    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    /// Base working directory of the recorded run
    pub fn working_dir(&self) -> PathBuf {
        PathBuf::from(&self.initial_state.working_dir)
    }

    /// Append an event; record mode only
    pub fn record_event(&mut self, event: Event) -> ReplayResult<()> {
        if self.mode != ReplayMode::Record {
            return Err(ReplayError::Misconfigured(
                "cannot record events in replay mode".to_string(),
            ));
        }
        self.events.push(event);
        Ok(())
    }

    /// Whether replay has events left to consume
    pub fn has_remaining(&self) -> bool {
        self.replay_index < self.events.len()
    }

    /// Position of the replay cursor
    pub fn position(&self) -> usize {
        self.replay_index
    }

    /// Take the next recorded event; replay mode only
    pub fn consume(&mut self) -> ReplayResult<Event> {
        if self.mode != ReplayMode::Replay {
            return Err(ReplayError::Misconfigured(
                "cannot consume events in record mode".to_string(),
            ));
        }
        let Some(event) = self.events.get(self.replay_index) else {
            return Err(ReplayError::Exhausted);
        };
        self.replay_index += 1;
        Ok(event.clone())
    }

    /// Persist everything recorded since the last save
    ///
    /// The first save writes the initial-state header; every save appends
    /// only the new events so persistence stays cheap for long sessions.
    pub fn save(&mut self) -> ReplayResult<()> {
        if self.mode != ReplayMode::Record {
            return Ok(());
        }
        if self.events.len() == self.saved_count {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut text = String::new();
        for event in &self.events[self.saved_count..] {
            let event_yaml = serde_yaml::to_string(event)?;
            for (i, line) in event_yaml.trim_end_matches('\n').split('\n').enumerate() {
                if i == 0 {
                    text.push_str("- ");
                } else {
                    text.push_str("  ");
                }
                text.push_str(line);
                text.push('\n');
            }
        }

        // First save replaces any stale file wholesale; later saves append
        if self.saved_count == 0 {
            #[derive(Serialize)]
            struct Header<'a> {
                initial_state: &'a InitialState,
            }
            let mut full = serde_yaml::to_string(&Header {
                initial_state: &self.initial_state,
            })?;
            full.push_str("events:\n");
            full.push_str(&text);
            std::fs::write(&self.path, full)?;
        } else {
            let mut file = std::fs::OpenOptions::new().append(true).open(&self.path)?;
            file.write_all(text.as_bytes())?;
        }
        self.saved_count = self.events.len();
        Ok(())
    }
}

/// Cassette handle shared by the session and bridge wrappers
///
/// Events from both boundaries interleave through this single cursor, which
/// is what makes replay ordering strict.
#[derive(Clone)]
pub struct SharedCassette(Arc<Mutex<Cassette>>);

impl SharedCassette {
    /// Wrap a cassette for sharing
    pub fn new(cassette: Cassette) -> Self {
        Self(Arc::new(Mutex::new(cassette)))
    }

    /// Lock the cassette; a poisoned lock still yields the inner state
    pub fn lock(&self) -> MutexGuard<'_, Cassette> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Initial state rooted at `working_dir`
pub fn initial_state(working_dir: &Path) -> InitialState {
    InitialState {
        working_dir: working_dir.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::ShellResult;
    use crate::replay::events::RecordedOutcome;

    fn push_event(name: &str) -> Event {
        Event::Push {
            name: name.to_string(),
            arguments: String::new(),
            working_dir: None,
        }
    }

    fn action_event(command: &str, output: &str) -> Event {
        Event::Action {
            working_dir: "/work".to_string(),
            operation: crate::effect::Operation::Command {
                command: command.to_string(),
            },
            context: "test".to_string(),
            outcome: RecordedOutcome::Shell(ShellResult {
                success: true,
                exit_code: 0,
                output: output.to_string(),
            }),
        }
    }

    #[test]
    fn test_record_then_replay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");

        let mut cassette = Cassette::record(&path, initial_state(Path::new("/work")));
        cassette.record_event(push_event("release")).unwrap();
        cassette.save().unwrap();
        cassette
            .record_event(action_event("echo 1", "1\n"))
            .unwrap();
        cassette.save().unwrap();
        cassette
            .record_event(Event::CallerOutput {
                output: "## All Steps Completed\n\nDone.".to_string(),
            })
            .unwrap();
        cassette.save().unwrap();

        let mut replay = Cassette::replay(&path).unwrap();
        assert_eq!(replay.working_dir(), PathBuf::from("/work"));
        assert_eq!(replay.consume().unwrap(), push_event("release"));
        assert_eq!(replay.consume().unwrap(), action_event("echo 1", "1\n"));
        assert!(matches!(
            replay.consume().unwrap(),
            Event::CallerOutput { .. }
        ));
        assert!(!replay.has_remaining());
        assert!(matches!(replay.consume(), Err(ReplayError::Exhausted)));
    }

    #[test]
    fn test_incremental_saves_match_one_shot_file() {
        let dir = tempfile::tempdir().unwrap();
        let incremental = dir.path().join("incremental.yaml");
        let oneshot = dir.path().join("oneshot.yaml");
        let events = vec![
            push_event("a"),
            action_event("echo x", "x\n"),
            push_event("b"),
        ];

        let mut cassette = Cassette::record(&incremental, initial_state(Path::new("/work")));
        for event in &events {
            cassette.record_event(event.clone()).unwrap();
            cassette.save().unwrap();
        }

        let mut cassette = Cassette::record(&oneshot, initial_state(Path::new("/work")));
        for event in &events {
            cassette.record_event(event.clone()).unwrap();
        }
        cassette.save().unwrap();

        let a: CassetteFile =
            serde_yaml::from_str(&std::fs::read_to_string(&incremental).unwrap()).unwrap();
        let b: CassetteFile =
            serde_yaml::from_str(&std::fs::read_to_string(&oneshot).unwrap()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.events, events);
    }

    #[test]
    fn test_multiline_output_survives_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multiline.yaml");
        let event = Event::CallerOutput {
            output: "### Steps executed:\n- `a[0]`: ok `echo 1`\n\n  <output>\n  1\n  </output>"
                .to_string(),
        };

        let mut cassette = Cassette::record(&path, initial_state(Path::new("/work")));
        cassette.record_event(push_event("a")).unwrap();
        cassette.save().unwrap();
        cassette.record_event(event.clone()).unwrap();
        cassette.save().unwrap();

        let file: CassetteFile =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(file.events[1], event);
    }

    #[test]
    fn test_mode_misuse_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("misuse.yaml");

        let mut record = Cassette::record(&path, initial_state(Path::new("/work")));
        assert!(matches!(
            record.consume(),
            Err(ReplayError::Misconfigured(_))
        ));
        record.record_event(push_event("a")).unwrap();
        record.save().unwrap();

        let mut replay = Cassette::replay(&path).unwrap();
        assert!(matches!(
            replay.record_event(push_event("b")),
            Err(ReplayError::Misconfigured(_))
        ));
        // save is a no-op in replay mode
        replay.save().unwrap();
    }

    #[test]
    fn test_replay_of_missing_cassette_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = Cassette::replay(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ReplayError::Io(_)));
    }

    #[test]
    fn test_replay_rejects_malformed_cassette() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "events:\n- type: push\n  name: a\n").unwrap();
        let err = Cassette::replay(&path).unwrap_err();
        assert!(matches!(err, ReplayError::Yaml(_)));
    }
}
