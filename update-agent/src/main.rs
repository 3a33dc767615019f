//! The update agent keeps a device's firmware in sync with its update server.
//!
//! It is a simple state machine that loops through the following steps:
//!
//! 1. wait out the polling interval;
//! 2. probe the server for a package targeting this device;
//! 3. download the package's objects for this device's installation set,
//!    verifying each against its listed sha256;
//! 4. install every object through its declared install mode;
//! 5. reboot if the package requires it, otherwise go back to waiting.
//!
//! Transient failures route back to the wait, with the next poll delayed by
//! an exponential backoff; fatal failures terminate the process with an LSB
//! exit code.
use std::{borrow::Cow, fs, path::Path};

use clap::Parser as _;
use eyre::WrapErr;
use ota_update_agent::{
    filesystem::{FilesystemManager, SystemRunner},
    installer::InstallModeRegistry,
    logging,
    machine::UpdateAgent,
    rebooter::SystemRebooter,
    ApiClient, Args, Settings,
};
use tracing::{error, info};

mod update_agent_result;
use update_agent_result::UpdateAgentResult;

const CFG_DEFAULT_PATH: &str = "/etc/ota_update_agent.conf";
const ENV_VAR_PREFIX: &str = "OTA_UPDATE_AGENT_";
const CFG_ENV_VAR: &str = const_format::concatcp!(ENV_VAR_PREFIX, "CONFIG");

fn main() -> UpdateAgentResult {
    logging::init();

    let args = Args::parse();

    match run(&args) {
        Ok(result) => result,
        Err(err) => {
            error!("{err:?}");
            UpdateAgentResult::Failure
        }
    }
}

fn get_config_source(args: &Args) -> Cow<'_, Path> {
    if let Some(config) = &args.config {
        info!("using config provided by command line argument: `{config}`");
        Cow::Borrowed(config.as_ref())
    } else if let Some(config) = figment::providers::Env::var(CFG_ENV_VAR) {
        info!("using config set in environment variable `{CFG_ENV_VAR}={config}`");
        Cow::Owned(std::path::PathBuf::from(config))
    } else {
        info!("using default config at `{CFG_DEFAULT_PATH}`");
        Cow::Borrowed(CFG_DEFAULT_PATH.as_ref())
    }
}

fn prepare_environment(settings: &Settings) -> eyre::Result<()> {
    fs::create_dir_all(&settings.downloads).wrap_err_with(|| {
        format!(
            "failed creating download directory `{}`",
            settings.downloads.display(),
        )
    })?;
    if let Some(parent) = settings.runtime_state.parent() {
        fs::create_dir_all(parent).wrap_err_with(|| {
            format!(
                "failed creating runtime state directory `{}`",
                parent.display(),
            )
        })?;
    }
    Ok(())
}

fn run(args: &Args) -> eyre::Result<UpdateAgentResult> {
    let config_path = get_config_source(args);

    let settings = Settings::get(args, config_path, ENV_VAR_PREFIX)
        .wrap_err("failed reading settings")?;
    prepare_environment(&settings)?;

    // The guards keep the builtin install modes registered for the lifetime
    // of the agent.
    let (registry, _mode_guards) = InstallModeRegistry::with_builtin_modes();

    let api_client = ApiClient::new(&settings.server_address);
    let rebooter = SystemRebooter::new(!settings.nodbus);
    let filesystem = FilesystemManager::new(Box::new(SystemRunner));

    let mut agent = UpdateAgent::new(
        api_client,
        Box::new(rebooter),
        filesystem,
        registry,
        settings,
    );
    agent.run();

    match agent.fatal_failure() {
        None => Ok(UpdateAgentResult::Success),
        Some(err) => {
            error!("update agent stopped on fatal error: {err}");
            Ok(UpdateAgentResult::from(err))
        }
    }
}
