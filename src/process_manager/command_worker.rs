// External predictor processes
// Spawns one worker process per variant and reads its JSON line protocol

use crate::models::{Prediction, PredictionRequest};
use crate::predictor::{AbortSignal, PredictionError, Predictor};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Result {
        data: Prediction,
    },
    Error {
        message: String,
    },
    Log {
        level: String,
        message: String,
    },
}

/// Runs `program args...` once per request. The request is written to stdin
/// as JSON; the worker answers with JSON lines on stdout.
#[derive(Debug, Clone)]
pub struct CommandPredictor {
    program: String,
    args: Vec<String>,
}

impl CommandPredictor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a full argv, e.g. `["python3", "talen_worker.py"]`
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    fn run(&self, request: &PredictionRequest, abort: &AbortSignal) -> Result<Prediction, PredictionError> {
        if abort.is_aborted() {
            return Err(PredictionError::Worker("Call aborted before spawn".to_string()));
        }

        let input_json = serde_json::to_string(request)
            .map_err(|e| PredictionError::Worker(format!("Failed to serialize input: {}", e)))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn().map_err(|e| {
            PredictionError::Worker(format!("Failed to spawn {}: {}", self.program, e))
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        // Killing the child closes its stdout, which ends the read loop below
        let child = Arc::new(Mutex::new(child));
        {
            let child = child.clone();
            let program = self.program.clone();
            abort.on_abort(move || {
                if let Err(e) = child.lock().kill() {
                    debug!("[{}] kill after abort: {}", program, e);
                }
            });
        }

        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.write_all(input_json.as_bytes()) {
                reap(&child, &self.program);
                return Err(PredictionError::Worker(format!("Failed to write to stdin: {}", e)));
            }
            // stdin closes on drop so the worker sees EOF
        }

        let Some(stdout) = stdout else {
            reap(&child, &self.program);
            return Err(PredictionError::Worker("Failed to capture stdout".to_string()));
        };

        let mut last_result: Option<Prediction> = None;
        let mut last_error: Option<String> = None;

        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            match serde_json::from_str::<WorkerMessage>(&line) {
                Ok(WorkerMessage::Result { data }) => last_result = Some(data),
                Ok(WorkerMessage::Error { message }) => last_error = Some(message),
                Ok(WorkerMessage::Log { level, message }) => match level.as_str() {
                    "warn" | "warning" | "error" => warn!("[{}] {}", self.program, message),
                    "info" => info!("[{}] {}", self.program, message),
                    _ => debug!("[{}] {}", self.program, message),
                },
                Err(_) => debug!("[{}] {}", self.program, line),
            }
        }

        let status = wait_for_exit(&child)
            .map_err(|e| PredictionError::Worker(format!("Failed to wait for process: {}", e)))?;

        if abort.is_aborted() {
            return Err(PredictionError::Worker(format!(
                "{} killed after abort",
                self.program
            )));
        }

        if let Some(error) = last_error {
            return Err(PredictionError::Rejected(error));
        }

        if !status.success() {
            return Err(PredictionError::Worker(format!(
                "{} exited with code: {}",
                self.program,
                status.code().unwrap_or(-1)
            )));
        }

        last_result.ok_or_else(|| {
            PredictionError::Worker(format!("No result from {} for position {}", self.program, request.position))
        })
    }
}

// Polls so the abort hook never waits on the lock behind a blocking wait()
fn wait_for_exit(child: &Mutex<Child>) -> std::io::Result<ExitStatus> {
    loop {
        if let Some(status) = child.lock().try_wait()? {
            return Ok(status);
        }
        std::thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn reap(child: &Mutex<Child>, program: &str) {
    let mut child = child.lock();
    if let Err(e) = child.kill().and_then(|_| child.wait()) {
        debug!("[{}] reap failed: {}", program, e);
    }
}

impl Predictor for CommandPredictor {
    fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictionError> {
        self.run(request, &AbortSignal::new())
    }

    fn predict_abortable(
        &self,
        request: &PredictionRequest,
        abort: &AbortSignal,
    ) -> Result<Prediction, PredictionError> {
        self.run(request, abort)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::{SpacerBounds, Window};
    use std::time::Instant;

    fn request() -> PredictionRequest {
        PredictionRequest {
            position: 100,
            reference_base: "A".to_string(),
            spacer: SpacerBounds { min: 14, max: 18 },
            arm_length: 18,
            window: Window { start: 63, end: 137 },
        }
    }

    fn shell(script: &str) -> CommandPredictor {
        CommandPredictor::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn process_alive(pid: &str) -> bool {
        Command::new("sh")
            .args(["-c", &format!("kill -0 {} 2>/dev/null", pid)])
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_result_message() {
        let predictor = shell(
            r#"cat > /dev/null
echo 'starting up'
echo '{"type":"log","level":"info","message":"scanning"}'
echo '{"type":"result","data":{"spacer_start":95,"spacer_end":110,"left_talen":"AC","right_talen":"GT","left_rvd":"NI-HD","right_rvd":"NN-NG"}}'"#,
        );

        let prediction = predictor.predict(&request()).unwrap();
        assert_eq!(prediction.spacer_start, 95);
        assert_eq!(prediction.right_rvd, "NN-NG");
    }

    #[test]
    fn test_error_message_is_permanent() {
        let predictor = shell(r#"cat > /dev/null; echo '{"type":"error","message":"no spacer"}'"#);
        let err = predictor.predict(&request()).unwrap_err();
        assert_eq!(err, PredictionError::Rejected("no spacer".to_string()));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_nonzero_exit_is_transient() {
        let predictor = shell("cat > /dev/null; exit 3");
        let err = predictor.predict(&request()).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_program() {
        let predictor = CommandPredictor::new("/nonexistent/talen-worker", vec![]);
        assert!(matches!(
            predictor.predict(&request()),
            Err(PredictionError::Worker(_))
        ));
    }

    #[test]
    fn test_from_argv() {
        assert!(CommandPredictor::from_argv(&[]).is_none());
        let predictor = CommandPredictor::from_argv(&["python3".to_string(), "w.py".to_string()]).unwrap();
        assert_eq!(predictor.program, "python3");
        assert_eq!(predictor.args, vec!["w.py"]);
    }

    #[test]
    fn test_abort_kills_and_reaps_worker() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        let predictor = shell(&format!(
            "echo $$ > '{}'; cat > /dev/null; exec sleep 30",
            pid_file.display()
        ));

        let abort = Arc::new(AbortSignal::new());
        let trigger = abort.clone();
        let aborter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            trigger.abort();
        });

        let started = Instant::now();
        let err = predictor.predict_abortable(&request(), &abort).unwrap_err();
        aborter.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(err, PredictionError::Worker(_)));
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(!process_alive(pid.trim()));
    }

    #[test]
    fn test_aborted_call_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let predictor = shell(&format!("touch '{}'", marker.display()));

        let abort = AbortSignal::new();
        abort.abort();
        assert!(predictor.predict_abortable(&request(), &abort).is_err());
        assert!(!marker.exists());
    }
}
