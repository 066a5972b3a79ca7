use anyhow::Result;
use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn connect_reaches_running_against_fixture_peer() -> Result<()> {
    let mut cmd = Command::cargo_bin("nc-cli")?;
    cmd.arg("connect");
    cmd.assert().success().stdout(contains("Running"));
    Ok(())
}

#[test]
fn get_prints_fixture_data() -> Result<()> {
    let mut cmd = Command::cargo_bin("nc-cli")?;
    cmd.arg("get");
    cmd.assert().success().stdout(contains("demo-host"));
    Ok(())
}

#[test]
fn get_config_prints_fixture_data() -> Result<()> {
    let mut cmd = Command::cargo_bin("nc-cli")?;
    cmd.arg("get").arg("--config");
    cmd.assert().success().stdout(contains("demo-host"));
    Ok(())
}

#[test]
fn edit_config_acknowledges_ok() -> Result<()> {
    let mut cmd = Command::cargo_bin("nc-cli")?;
    cmd.arg("edit-config").arg("<system><hostname>new-host</hostname></system>");
    cmd.assert().success().stdout(contains("ok"));
    Ok(())
}

#[test]
fn subscribe_receives_notification_and_completes() -> Result<()> {
    let mut cmd = Command::cargo_bin("nc-cli")?;
    cmd.arg("subscribe");
    cmd.assert().success().stdout(contains("interface-up"));
    Ok(())
}
