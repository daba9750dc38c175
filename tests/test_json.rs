mod fixtures;

use anyhow::Result;
use fixtures::*;
use rstest::*;

#[rstest]
fn test_json(mut rootstrap: RootstrapManager) -> Result<()> {
    rootstrap.run(&["--json", "-d", "mageia", "-p", "kernel", "config", "release", "packages"])?;

    let json: serde_json::Value = serde_json::from_str(&rootstrap.last_stdout)?;
    println!("json: {}", json);
    assert_eq!(json["status"], "success");
    assert_eq!(json["release"], "cauldron");
    assert_eq!(json["packages"], serde_json::json!(["kernel"]));
    Ok(())
}

/* Errors are reported in the JSON blob too, alongside a non-zero exit. */
#[rstest]
fn test_json_error(mut rootstrap: RootstrapManager) -> Result<()> {
    assert!(rootstrap.xfail(&["--json", "config", "colour"]));
    let json: serde_json::Value = serde_json::from_str(&rootstrap.last_stdout)?;
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().unwrap_or_default().contains("colour"));
    Ok(())
}
