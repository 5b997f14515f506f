use std::fs;
use std::time::Duration;

use pokerbots_env::engine::{
    ConfigValue, Engine, EngineError, EngineProcess, EngineSettings, default_engine_config,
};

#[test]
fn rendered_config_merges_overrides_over_defaults() {
    let settings = EngineSettings::new("/nonexistent")
        .with_override("STARTING_GAME_CLOCK", 1200.0f64)
        .with_override("NUM_ROUNDS", 50i64);
    let rendered = settings.render_config();

    assert!(rendered.starts_with("# Training configuration\n"));
    assert!(rendered.contains("STARTING_GAME_CLOCK = 1200.0\n"), "{rendered}");
    assert!(rendered.contains("NUM_ROUNDS = 50\n"));
    assert!(rendered.contains("PLAYER_1_NAME = \"Agent\"\n"));
    assert!(rendered.contains("ENFORCE_GAME_CLOCK = False\n"));
    assert!(!rendered.contains("NUM_ROUNDS = 100"));
}

#[test]
fn training_preset_relaxes_the_clocks() {
    let settings = EngineSettings::training("/nonexistent");
    assert_eq!(
        settings.overrides.get("STARTING_GAME_CLOCK"),
        Some(&ConfigValue::Float(600.0))
    );
    assert_eq!(
        settings.overrides.get("PLAYER_TIMEOUT"),
        Some(&ConfigValue::Int(300))
    );
    assert_eq!(
        settings.overrides.get("ENFORCE_GAME_CLOCK"),
        Some(&ConfigValue::Bool(false))
    );
}

#[test]
fn default_engine_config_matches_the_heads_up_game() {
    let config = default_engine_config();
    assert_eq!(config.get("STARTING_STACK"), Some(&ConfigValue::Int(400)));
    assert_eq!(config.get("BIG_BLIND"), Some(&ConfigValue::Int(2)));
    assert_eq!(config.get("SMALL_BLIND"), Some(&ConfigValue::Int(1)));
    assert_eq!(config.get("STARTING_GAME_CLOCK"), Some(&ConfigValue::Float(3600.0)));
}

#[test]
fn config_values_render_as_python_literals() {
    assert_eq!(ConfigValue::from(true).to_string(), "True");
    assert_eq!(ConfigValue::from(3i64).to_string(), "3");
    assert_eq!(ConfigValue::from(2.5f64).to_string(), "2.5");
    assert_eq!(ConfigValue::from("./bot").to_string(), "\"./bot\"");
}

#[test]
fn training_directory_holds_engine_files_config_and_player_stub() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    fs::write(source.path().join("engine.py"), "print('engine')\n")?;
    fs::create_dir_all(source.path().join("python_skeleton/skeleton"))?;
    fs::write(source.path().join("python_skeleton/player.py"), "# bot\n")?;
    fs::write(source.path().join("python_skeleton/skeleton/actions.py"), "# actions\n")?;

    let mut process = EngineProcess::new(EngineSettings::training(source.path()));
    let dir = process.create_training_dir()?;
    assert_eq!(process.training_dir(), Some(dir.as_path()));
    assert!(
        dir.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("poker_training_"))
    );

    assert!(dir.join("engine.py").is_file());
    assert!(dir.join("python_skeleton/skeleton/actions.py").is_file());
    let config = fs::read_to_string(dir.join("config.py"))?;
    assert!(config.contains("STARTING_GAME_CLOCK = 600.0"));
    assert!(config.contains("PLAYER_TIMEOUT = 300"));

    let commands: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("agent_bot/commands.json"))?)?;
    assert_eq!(commands["build"], serde_json::json!([]));
    assert_eq!(commands["run"], serde_json::json!(["python3", "player.py"]));

    let player = dir.join("agent_bot/player.py");
    let script = fs::read_to_string(&player)?;
    assert!(script.starts_with("#!/usr/bin/env python3"));
    assert!(script.contains("K\\n"));
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&player)?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "player stub is executable: {mode:o}");
    }

    process.stop();
    assert!(!dir.exists(), "training directory removed on stop");
    assert_eq!(process.training_dir(), None);
    Ok(())
}

#[test]
fn missing_engine_files_are_tolerated() -> anyhow::Result<()> {
    let empty = tempfile::tempdir()?;
    let mut process = EngineProcess::new(EngineSettings::new(empty.path()));
    let dir = process.create_training_dir()?;
    assert!(!dir.join("engine.py").exists());
    assert!(dir.join("config.py").is_file());
    Ok(())
}

#[test]
fn unknown_engine_command_fails_to_spawn() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    let mut settings = EngineSettings::new(source.path());
    settings.command = vec!["pokerbots-env-no-such-engine".to_string()];

    let mut process = EngineProcess::new(settings);
    let err = process.start().err().expect("spawn fails");
    assert!(matches!(err, EngineError::Spawn(_)), "{err}");
    assert!(!process.is_running());
    assert_eq!(process.training_dir(), None);
    Ok(())
}

#[test]
fn engine_that_exits_early_is_reported() -> anyhow::Result<()> {
    let source = tempfile::tempdir()?;
    let mut settings = EngineSettings::new(source.path());
    settings.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo booting; exit 3".to_string(),
    ];
    settings.startup_grace = Duration::from_millis(300);

    let mut process = EngineProcess::new(settings);
    let err = process.start().err().expect("engine exits");
    match &err {
        EngineError::Exited { status, output } => {
            assert!(status.contains('3'), "{status}");
            assert!(output.iter().any(|line| line == "booting"), "{output:?}");
        }
        other => panic!("expected early exit, got {other}"),
    }
    assert!(!process.is_running());
    Ok(())
}

#[test]
fn empty_engine_command_is_a_spawn_error() {
    let mut settings = EngineSettings::new("/nonexistent");
    settings.command.clear();

    let mut process = EngineProcess::new(settings);
    let err = process.start().err().expect("nothing to spawn");
    assert!(matches!(err, EngineError::Spawn(_)), "{err}");
    assert_eq!(process.training_dir(), None);
}

#[test]
fn engine_output_survives_a_failed_connect() -> anyhow::Result<()> {
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let source = tempfile::tempdir()?;
    let mut settings = EngineSettings::new(source.path());
    settings.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo ready; exec sleep 5".to_string(),
    ];
    settings.port = port;
    settings.startup_grace = Duration::from_millis(200);
    settings.connect_timeout = Duration::from_millis(300);

    let mut process = EngineProcess::new(settings);
    let err = process.start().err().expect("nobody listens");
    assert!(matches!(err, EngineError::Connect { .. }), "{err}");
    assert!(!process.is_running());
    assert_eq!(process.drain_output(), vec!["ready".to_string()]);
    assert!(process.drain_output().is_empty());
    Ok(())
}
