use std::collections::HashMap;

use thiserror::Error;

/// Which role this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Issues requests against tasks registered elsewhere.
    Client,
    /// Serves the scenario's tasks until terminated.
    Server,
    /// Registers and calls the scenario's tasks within this one process.
    Loopback,
}

/// Which [`taskwire_tasks::Transport`] to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// An in-process [`taskwire_tasks::LoopbackTransport`].
    Loopback,
    /// A broker-backed [`taskwire_amqp::AmqpTransport`].
    Amqp,
}

/// Parsed command-line arguments for the `taskwire` binary.
#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    /// Which role this process plays.
    pub mode: Mode,
    /// Which transport to construct.
    pub transport: TransportKind,
    /// The AMQP broker URL, when `transport` is [`TransportKind::Amqp`].
    pub url: Option<String>,
    /// The namespace to operate in.
    pub namespace: String,
    /// The built-in demo scenario to run.
    pub scenario: String,
    /// Free-form `KEY=VALUE` options forwarded to the scenario's setup routine.
    pub options: HashMap<String, String>,
}

/// A failure to parse the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// `--mode` was not given.
    #[error("missing required --mode flag")]
    MissingMode,
    /// `--scenario` was not given.
    #[error("missing required --scenario flag")]
    MissingScenario,
    /// `--mode` was given a value other than `client`/`server`/`loopback`.
    #[error("unrecognized --mode value '{0}', expected one of client|server|loopback")]
    UnknownMode(String),
    /// `--transport` was given a value other than `loopback`/`amqp`.
    #[error("unrecognized --transport value '{0}', expected one of loopback|amqp")]
    UnknownTransport(String),
    /// A flag that expects a value was the last argument.
    #[error("flag '{0}' expects a value")]
    MissingValue(String),
    /// `-o`/`--option` was given a value with no `=` separator.
    #[error("malformed -o/--option value '{0}', expected KEY=VALUE")]
    MalformedOption(String),
    /// An argument did not match any known flag.
    #[error("unrecognized argument '{0}'")]
    UnrecognizedArgument(String),
}

impl Cli {
    /// Parses an iterator of arguments (excluding the program name).
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, CliError> {
        let mut mode = None;
        let mut transport = TransportKind::Loopback;
        let mut url = None;
        let mut namespace = "default".to_string();
        let mut scenario = None;
        let mut options = HashMap::new();

        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mode" => {
                    let value = args.next().ok_or_else(|| CliError::MissingValue(arg.clone()))?;
                    mode = Some(match value.as_str() {
                        "client" => Mode::Client,
                        "server" => Mode::Server,
                        "loopback" => Mode::Loopback,
                        other => return Err(CliError::UnknownMode(other.to_string())),
                    });
                }
                "--transport" => {
                    let value = args.next().ok_or_else(|| CliError::MissingValue(arg.clone()))?;
                    transport = match value.as_str() {
                        "loopback" => TransportKind::Loopback,
                        "amqp" => TransportKind::Amqp,
                        other => return Err(CliError::UnknownTransport(other.to_string())),
                    };
                }
                "--url" => {
                    url = Some(args.next().ok_or_else(|| CliError::MissingValue(arg.clone()))?);
                }
                "--namespace" => {
                    namespace = args.next().ok_or_else(|| CliError::MissingValue(arg.clone()))?;
                }
                "--scenario" => {
                    scenario = Some(args.next().ok_or_else(|| CliError::MissingValue(arg.clone()))?);
                }
                "-o" | "--option" => {
                    let value = args.next().ok_or_else(|| CliError::MissingValue(arg.clone()))?;
                    let (key, value) = value
                        .split_once('=')
                        .ok_or_else(|| CliError::MalformedOption(value.clone()))?;
                    options.insert(key.to_string(), value.to_string());
                }
                other => return Err(CliError::UnrecognizedArgument(other.to_string())),
            }
        }

        Ok(Self {
            mode: mode.ok_or(CliError::MissingMode)?,
            transport,
            url,
            namespace,
            scenario: scenario.ok_or(CliError::MissingScenario)?,
            options,
        })
    }
}
