use std::ffi::OsStr;
use std::process::ExitStatus;

/// Exit status and combined stdout/stderr of a finished subprocess.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run `program` to completion and capture everything it prints.
///
/// Failures are logged with exit code, command line and output. Successful
/// runs are only logged when `verbose` is set.
pub async fn run_command<I, S>(program: &str, args: I, verbose: bool) -> std::io::Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let command_line = std::iter::once(program.to_string())
        .chain(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ");

    let result = tokio::process::Command::new(program)
        .args(&args)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .inspect_err(|e| {
            tracing::error!(command = %command_line, error = %e, "Failed to start command");
        })?;

    let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&result.stderr));

    if !result.status.success() {
        tracing::warn!(
            command = %command_line,
            exit_code = ?result.status.code(),
            output = %output,
            "Command not successful"
        );
    } else if verbose {
        tracing::info!(
            command = %command_line,
            exit_code = ?result.status.code(),
            output = %output,
            "Command successful"
        );
    }

    Ok(CommandOutput {
        status: result.status,
        output,
    })
}
