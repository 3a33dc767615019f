// NOTE / REMINDER: Setting env vars in tests will clobber env vars in other tests. This means that
// each test *must* use a unique prefix for its environment variables to ensure they don't clobber
// other tests (and potentially cause non-deterministic error successes/failures depending on
// concurrent execution order).

use std::{path::Path, time::Duration};

use clap::Parser as _;
use figment::Jail;

use crate::settings::Settings;

const CFG_FILE_CONTENTS: &str = r#"
    server_address = "https://updates.example.com"
    product_uid = "0123456789"
    device_id = "config-device"
    hardware = "hardware1-revA"
    installation_set = 1
    polling_interval = 60
    download_delay = 3000
    downloads = "/config/downloads"
    runtime_state = "/config/state.json"
    nodbus = true
    noupdate = true
"#;

const CFG_FILE_CONTENTS_MINIMAL: &str = r#"
    server_address = "https://updates.example.com"
    product_uid = "0123456789"
    device_id = "config-device"
    hardware = "hardware1-revA"
"#;

fn make_args(args: &str) -> Result<crate::Args, clap::Error> {
    crate::Args::try_parse_from(str::split_ascii_whitespace(args))
}

#[test]
fn config_file_is_read() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", CFG_FILE_CONTENTS)?;
        let args = make_args("update-agent").unwrap();
        let settings =
            Settings::get(&args, Path::new("config.toml"), "smoke_test_")?;
        assert_eq!(settings.server_address, "https://updates.example.com");
        assert_eq!(settings.device_id, "config-device");
        assert_eq!(settings.installation_set, 1);
        assert_eq!(settings.polling_interval, Duration::from_secs(60));
        assert_eq!(settings.download_delay, Duration::from_millis(3000));
        assert!(settings.nodbus);
        assert!(settings.noupdate);
        Ok(())
    });
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", CFG_FILE_CONTENTS_MINIMAL)?;
        let args = make_args("update-agent").unwrap();
        let settings =
            Settings::get(&args, Path::new("config.toml"), "defaults_test_")?;
        assert_eq!(settings.installation_set, 0);
        assert_eq!(settings.polling_interval, Duration::from_secs(3600));
        assert_eq!(settings.download_delay, Duration::ZERO);
        assert_eq!(
            settings.downloads,
            Path::new("/var/lib/ota-update-agent/downloads"),
        );
        assert!(!settings.nodbus);
        assert!(!settings.noupdate);
        Ok(())
    });
}

#[test]
fn env_vars_override_the_config_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", CFG_FILE_CONTENTS)?;
        jail.set_env("env_override_test_device_id", "env-device");
        jail.set_env("env_override_test_polling_interval", "120");
        let args = make_args("update-agent").unwrap();
        let settings =
            Settings::get(&args, Path::new("config.toml"), "env_override_test_")?;
        assert_eq!(settings.device_id, "env-device");
        assert_eq!(settings.polling_interval, Duration::from_secs(120));
        Ok(())
    });
}

#[test]
fn args_override_env_vars_and_the_config_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", CFG_FILE_CONTENTS)?;
        jail.set_env("arg_override_test_device_id", "env-device");
        let args = make_args(
            "update-agent --device-id arg-device --downloads /args/downloads",
        )
        .unwrap();
        let settings =
            Settings::get(&args, Path::new("config.toml"), "arg_override_test_")?;
        assert_eq!(settings.device_id, "arg-device");
        assert_eq!(settings.downloads, Path::new("/args/downloads"));
        Ok(())
    });
}

#[test]
fn missing_required_fields_are_an_error() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "device_id = \"config-device\"")?;
        let args = make_args("update-agent").unwrap();
        assert!(Settings::get(&args, Path::new("config.toml"), "required_test_")
            .is_err());
        Ok(())
    });
}

#[test]
fn bool_flags_are_unset_by_default_in_args() {
    let args = make_args("update-agent").unwrap();
    assert!(!args.nodbus);
    assert!(!args.noupdate);
    let args = make_args("update-agent --nodbus --noupdate").unwrap();
    assert!(args.nodbus);
    assert!(args.noupdate);
}
