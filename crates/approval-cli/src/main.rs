//! Approval engine command line
//!
//! Drives the state machine over the file-backed store. Every command prints
//! pretty JSON; engine errors print `{"error": {"kind", "message"}}` and exit
//! non-zero.

mod commands;

use approval_core::EngineConfig;
use approval_types::{InstanceStatus, Metadata};
use clap::{value_parser, Arg, ArgMatches, Command};

fn instance_arg() -> Arg {
    Arg::new("instance")
        .long("instance")
        .short('i')
        .value_name("ID")
        .help("Approval instance id")
        .required(true)
}

fn user_arg() -> Arg {
    Arg::new("user")
        .long("user")
        .short('u')
        .value_name("USER_ID")
        .help("Acting user id")
        .required(true)
}

fn name_arg() -> Arg {
    Arg::new("name")
        .long("name")
        .value_name("NAME")
        .help("Display name recorded with the action (defaults to the configured name)")
}

fn reason_arg() -> Arg {
    Arg::new("reason")
        .long("reason")
        .short('r')
        .value_name("TEXT")
        .help("Free-text reason")
}

fn type_arg() -> Arg {
    Arg::new("type")
        .long("type")
        .short('t')
        .value_name("TARGET_TYPE")
        .help("Workflow (request) type")
}

fn parse_status(value: &str) -> Result<InstanceStatus, String> {
    value
        .parse()
        .map_err(|_| format!("unknown instance status '{}'", value))
}

fn parse_metadata(value: &str) -> Result<Metadata, String> {
    serde_json::from_str(value).map_err(|e| format!("metadata must be a JSON object: {}", e))
}

fn build_cli() -> Command {
    Command::new("approval-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multi-step approval workflow engine")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .env("APPROVAL_CONFIG")
                .global(true)
                .help("Configuration file path (built-in defaults when omitted)"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .env("APPROVAL_DATA_DIR")
                .global(true)
                .help("Data directory, overrides storage.data_dir"),
        )
        .subcommand(Command::new("catalog").about("List the configured workflow definitions"))
        .subcommand(
            Command::new("create")
                .about("Start a workflow for a target entity")
                .arg(type_arg().required(true))
                .arg(
                    Arg::new("target")
                        .long("target")
                        .value_name("TARGET_ID")
                        .help("Id of the entity under approval")
                        .required(true),
                )
                .arg(user_arg().help("Creating user id"))
                .arg(
                    Arg::new("metadata")
                        .long("metadata")
                        .short('m')
                        .value_name("JSON")
                        .help("JSON object attached to the instance")
                        .value_parser(parse_metadata),
                ),
        )
        .subcommand(
            Command::new("process")
                .about("Approve, reject or skip the pending step")
                .arg(instance_arg())
                .arg(
                    Arg::new("step")
                        .long("step")
                        .short('s')
                        .value_name("STEP_KEY")
                        .help("Key of the pending step")
                        .required(true),
                )
                .arg(
                    Arg::new("action")
                        .long("action")
                        .short('a')
                        .value_name("ACTION")
                        .help("approve, reject or skip")
                        .required(true),
                )
                .arg(user_arg())
                .arg(name_arg())
                .arg(reason_arg()),
        )
        .subcommand(
            Command::new("cancel")
                .about("Cancel an in-progress workflow")
                .arg(instance_arg())
                .arg(user_arg())
                .arg(name_arg())
                .arg(reason_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Show the state of one workflow")
                .arg(instance_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List workflows, newest first")
                .arg(type_arg())
                .arg(
                    Arg::new("status")
                        .long("status")
                        .value_name("STATUS")
                        .help("Instance status name or code")
                        .value_parser(parse_status),
                )
                .arg(
                    Arg::new("page")
                        .long("page")
                        .value_name("N")
                        .default_value("1")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("page-size")
                        .long("page-size")
                        .value_name("N")
                        .default_value("20")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("pending")
                .about("Workflows waiting on a user's decision")
                .arg(user_arg())
                .arg(type_arg()),
        )
}

fn load_config(matches: &ArgMatches) -> approval_core::Result<EngineConfig> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            let config = EngineConfig::from_file(path)?;
            log::info!("Loaded configuration from {}", path);
            config
        }
        None => EngineConfig::default(),
    };

    let config = match matches.get_one::<String>("data-dir") {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    };
    config.validate()?;

    log::debug!("Using data directory: {}", config.data_dir().display());
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = build_cli().get_matches();

    let result = match load_config(&matches) {
        Ok(config) => commands::run(&config, &matches).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            log::error!("{}", e);
            println!("{}", serde_json::to_string_pretty(&commands::error_body(&e))?);
            std::process::exit(commands::exit_code(&e));
        }
    }
}
