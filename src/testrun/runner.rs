//! Test command execution

use super::report::{classify_output, CommandRun, ExecutionStatus, TestFailure, TestSummary};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Run test commands in order under a shared working directory, each bounded
/// by `time_limit`, and aggregate their parsed results.
///
/// A spawn failure or timeout stops the sequence; everything already run
/// stays in the summary with the worst execution status winning.
pub async fn run_commands(
    commands: &[String],
    working_dir: &Path,
    time_limit: Duration,
) -> TestSummary {
    let mut summary = TestSummary::default();

    for command in commands {
        tracing::debug!(%command, "running test command");
        let start = Instant::now();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group so a timeout kill reaches the whole tree
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let mut failed = TestSummary::infrastructure(format!(
                    "failed to spawn `{}`: {}",
                    command, e
                ));
                failed.runs.push(CommandRun {
                    command: command.clone(),
                    exit_code: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
                summary.merge(failed);
                break;
            }
        };

        let output = match timeout(time_limit, wait_for_output(&mut child)).await {
            Ok(output) => output,
            Err(_) => {
                kill_process_tree(&mut child).await;
                let mut timed_out = TestSummary {
                    status: ExecutionStatus::TimedOut,
                    failures: vec![TestFailure {
                        name: "<runner>".to_string(),
                        detail: Some(format!(
                            "`{}` timed out after {:?}",
                            command, time_limit
                        )),
                    }],
                    ..TestSummary::default()
                };
                timed_out.runs.push(CommandRun {
                    command: command.clone(),
                    exit_code: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
                summary.merge(timed_out);
                break;
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let (mut parsed, exit_code) = match output {
            Ok((stdout, stderr, status)) => {
                let combined = format!("{}\n{}", stdout, stderr);
                (classify_output(&combined, status.code()), status.code())
            }
            Err(e) => (
                TestSummary::infrastructure(format!(
                    "failed to read output of `{}`: {}",
                    command, e
                )),
                None,
            ),
        };
        parsed.runs = vec![CommandRun {
            command: command.clone(),
            exit_code,
            duration_ms,
        }];
        summary.merge(parsed);
    }

    summary
}

/// Kill the child's whole process group where possible so grandchildren
/// spawned by the shell do not linger.
async fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::killpg(pid as i32, libc::SIGKILL);
        }
    }
    let _ = child.kill().await;
    let _ = child.wait().await;
}

async fn wait_for_output(
    child: &mut Child,
) -> Result<(String, String, std::process::ExitStatus), std::io::Error> {
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let drain_stdout = async {
        let mut buf = String::new();
        if let Some(ref mut out) = stdout_pipe {
            out.read_to_string(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };
    let drain_stderr = async {
        let mut buf = String::new();
        if let Some(ref mut err) = stderr_pipe {
            err.read_to_string(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };

    // Drain both pipes at once; a child filling one while we block on the
    // other would otherwise stall until the timeout
    let (stdout, stderr) = tokio::join!(drain_stdout, drain_stderr);
    let status = child.wait().await?;
    Ok((stdout?, stderr?, status))
}
