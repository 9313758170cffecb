// tests/config_loading.rs
use std::{env, fs};

use llm_cloud_status::config::{load_registry_default, EngineConfig};
use serial_test::serial;

const ENV_KEYS: [&str; 7] = [
    "STATUS_CONFIG_PATH",
    "STATUS_SOURCES_PATH",
    "STATUS_CACHE_TTL_SECS",
    "STATUS_REQUEST_TIMEOUT_SECS",
    "STATUS_BROWSER_TIMEOUT_SECS",
    "STATUS_LOG_LEVEL",
    "STATUS_BROWSER_WS_URL",
];

/// Run `f` inside an empty temp CWD with all STATUS_* vars cleared.
fn in_clean_dir<F: FnOnce(&std::path::Path)>(f: F) {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    for k in ENV_KEYS {
        env::remove_var(k);
    }

    f(tmp.path());

    for k in ENV_KEYS {
        env::remove_var(k);
    }
    env::set_current_dir(&old).unwrap();
}

#[test]
#[serial]
fn defaults_without_files() {
    in_clean_dir(|_| {
        let cfg = EngineConfig::load_default().unwrap();
        assert_eq!(cfg, EngineConfig::default());
        let reg = load_registry_default().unwrap();
        assert_eq!(reg.len(), 9);
    });
}

#[test]
#[serial]
fn config_file_then_env_overrides() {
    in_clean_dir(|dir| {
        fs::create_dir_all(dir.join("config")).unwrap();
        fs::write(
            dir.join("config/status.toml"),
            "cache_ttl_secs = 120\nlog_level = \"debug\"\ndisplay_utc_offset_hours = 0\n",
        )
        .unwrap();

        let cfg = EngineConfig::load_default().unwrap();
        assert_eq!(cfg.cache_ttl_secs, 120);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.display_utc_offset_hours, 0);

        env::set_var("STATUS_CACHE_TTL_SECS", "15");
        env::set_var("STATUS_BROWSER_WS_URL", "ws://127.0.0.1:9222/devtools/browser/abc");
        let cfg = EngineConfig::load_default().unwrap();
        assert_eq!(cfg.cache_ttl_secs, 15);
        assert_eq!(
            cfg.browser_ws_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );

        env::set_var("STATUS_CACHE_TTL_SECS", "soon");
        assert!(EngineConfig::load_default().is_err());
    });
}

#[test]
#[serial]
fn env_path_must_exist() {
    in_clean_dir(|dir| {
        env::set_var("STATUS_CONFIG_PATH", dir.join("nope.toml").display().to_string());
        assert!(EngineConfig::load_default().is_err());

        env::set_var("STATUS_SOURCES_PATH", dir.join("nope.toml").display().to_string());
        assert!(load_registry_default().is_err());
    });
}

#[test]
#[serial]
fn sources_file_replaces_builtin_registry() {
    in_clean_dir(|dir| {
        let p = dir.join("mine.json");
        fs::write(
            &p,
            r#"{"sources": [{
                "id": "acme", "display_name": "Acme", "category": "cloud",
                "strategy": "feed", "endpoint": "https://status.acme.test/feed.rss",
                "status_page_url": "https://status.acme.test",
                "rule": {"kind": "incident_presence"}
            }]}"#,
        )
        .unwrap();
        env::set_var("STATUS_SOURCES_PATH", p.display().to_string());

        let reg = load_registry_default().unwrap();
        assert_eq!(reg.ids(), vec!["acme".to_string()]);
    });
}

#[test]
#[serial]
fn shipped_config_files_are_valid() {
    let root = env!("CARGO_MANIFEST_DIR");
    let cfg = EngineConfig::load_from_file(format!("{root}/config/status.toml")).unwrap();
    assert_eq!(cfg.cache_ttl_secs, 60);

    let reg = llm_cloud_status::config::load_registry_from(std::path::Path::new(&format!(
        "{root}/config/sources.toml"
    )))
    .unwrap();
    let builtin = llm_cloud_status::registry::Registry::builtin();
    assert_eq!(reg.ids(), builtin.ids());
    for desc in builtin.iter() {
        assert_eq!(reg.get(&desc.id), Some(desc), "{}", desc.id);
    }
}
