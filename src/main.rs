use clap::{Args, Parser, Subcommand};
use opsguard::app::App;
use opsguard::errors::ToolError;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[clap(
    name = "opsguard",
    version = env!("CARGO_PKG_VERSION"),
    about = "Guarded, read-only remote operations over SSH"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Hostname or IPv4 address
    #[clap(long)]
    host: String,
    #[clap(long)]
    port: Option<u16>,
    #[clap(long)]
    username: Option<String>,
    /// Falls back to OPSGUARD_SSH_DEFAULT_PASSWORD
    #[clap(long)]
    password: Option<String>,
    /// Expected SHA256 host key fingerprint
    #[clap(long)]
    host_key_fingerprint: Option<String>,
}

impl TargetArgs {
    fn into_args(self, action: &str) -> Value {
        let mut args = json!({ "action": action, "host": self.host });
        if let Some(port) = self.port {
            args["port"] = json!(port);
        }
        if let Some(username) = self.username {
            args["username"] = json!(username);
        }
        if let Some(password) = self.password {
            args["password"] = json!(password);
        }
        if let Some(fingerprint) = self.host_key_fingerprint {
            args["host_key_fingerprint"] = json!(fingerprint);
        }
        args
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an allow-listed command
    Exec {
        #[clap(flatten)]
        target: TargetArgs,
        /// Timeout in seconds
        #[clap(long)]
        timeout: Option<u64>,
        command: String,
    },
    /// CPU, memory, disk, load and uptime
    Status {
        #[clap(flatten)]
        target: TargetArgs,
    },
    /// systemctl status, journal tail and process check for a service
    Diagnose {
        #[clap(flatten)]
        target: TargetArgs,
        service: String,
    },
    /// Whether a systemd unit is active
    Service {
        #[clap(flatten)]
        target: TargetArgs,
        service: String,
    },
    /// docker ps -a
    Containers {
        #[clap(flatten)]
        target: TargetArgs,
        #[clap(long)]
        name: Option<String>,
    },
    /// kubectl get pods -o wide
    Pods {
        #[clap(flatten)]
        target: TargetArgs,
        #[clap(long, default_value = "default")]
        namespace: String,
    },
    /// Connect and authenticate only
    Test {
        #[clap(flatten)]
        target: TargetArgs,
    },
    /// Check a command (and optionally a host) without connecting
    Validate {
        #[clap(long)]
        host: Option<String>,
        command: String,
    },
    /// Print the allowed command prefixes
    AllowedCommands,
    /// JSON-RPC over stdio
    Serve,
}

fn to_call(command: Command) -> Option<(&'static str, Value)> {
    Some(match command {
        Command::Exec {
            target,
            timeout,
            command,
        } => {
            let mut args = target.into_args("exec");
            args["command"] = json!(command);
            if let Some(timeout) = timeout {
                args["timeout"] = json!(timeout);
            }
            ("ssh", args)
        }
        Command::Status { target } => ("ops", target.into_args("status")),
        Command::Diagnose { target, service } => {
            let mut args = target.into_args("diagnose");
            args["service_name"] = json!(service);
            ("ops", args)
        }
        Command::Service { target, service } => {
            let mut args = target.into_args("service_status");
            args["service_name"] = json!(service);
            ("ops", args)
        }
        Command::Containers { target, name } => {
            let mut args = target.into_args("containers");
            if let Some(name) = name {
                args["container_name"] = json!(name);
            }
            ("ops", args)
        }
        Command::Pods { target, namespace } => {
            let mut args = target.into_args("pods");
            args["namespace"] = json!(namespace);
            ("ops", args)
        }
        Command::Test { target } => ("ssh", target.into_args("test_connection")),
        Command::Validate { host, command } => {
            let mut args = json!({ "action": "validate", "command": command });
            if let Some(host) = host {
                args["host"] = json!(host);
            }
            ("ssh", args)
        }
        Command::AllowedCommands => ("ssh", json!({ "action": "allowed_commands" })),
        Command::Serve => return None,
    })
}

async fn run(cli: Cli) -> Result<(), ToolError> {
    let Some((tool, args)) = to_call(cli.command) else {
        return opsguard::mcp::server::run_stdio().await;
    };
    let app = App::initialize()?;
    let result = app.tool_executor.execute(tool, args).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string())
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("opsguard: {}", err);
        if let Some(hint) = &err.hint {
            eprintln!("hint: {}", hint);
        }
        let code = if err.is_denied() { 2 } else { 1 };
        std::process::exit(code);
    }
}
