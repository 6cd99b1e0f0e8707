use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use jitgdb::{Error, Launcher, Policy};

/// Environment variable telling a re-executed test binary which crash to act out.
const ROLE_VAR: &str = "JITGDB_TEST_ROLE";

/// Whether this process was started by [`role()`] to play `name`.
pub fn playing(name: &str) -> bool {
    env::var(ROLE_VAR).map_or(false, |role| role == name)
}

/// Arm the crash handler as this build expects: via `init()`, or, with `preload`, by
/// checking that the library constructor already did.
pub fn arm() -> Result<()> {
    if cfg!(feature = "preload") {
        expect_armed_at_load()
    } else {
        jitgdb::init()?;
        Ok(())
    }
}

/// Fail unless the crash handler was installed before `main`.
pub fn expect_armed_at_load() -> Result<()> {
    let launcher = Launcher::new("/nonexistent/xterm", "gdb")?;

    match jitgdb::install(Policy::default(), launcher) {
        Err(Error::AlreadyInstalled) => Ok(()),
        other => bail!("crash handler was not armed at load: {other:?}"),
    }
}

/// Re-run this test binary, executing only `test`, which should check [`playing()`].
///
/// Any `JITGDB_*` settings from the outer environment are cleared.
pub fn role(test: &str, name: &str) -> Result<Command> {
    let mut cmd = Command::new(env::current_exe()?);
    cmd.args([test, "--exact", "--nocapture", "--test-threads=1"]);

    for (var, _) in env::vars_os() {
        if var.to_string_lossy().starts_with("JITGDB_") {
            cmd.env_remove(var);
        }
    }

    cmd.env(ROLE_VAR, name);

    Ok(cmd)
}

/// Write an executable "terminal emulator" that records its arguments, one per line, to
/// `out`. The file appears atomically once complete.
pub fn fake_terminal(dir: &Path, out: &Path) -> Result<PathBuf> {
    let out = out.display();
    let script = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > \"{out}.tmp\"\nmv \"{out}.tmp\" \"{out}\"\n"
    );

    let path = dir.join("fake-term");
    fs::write(&path, script)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;

    Ok(path)
}

/// Poll for `path` to exist, then return its lines.
pub fn wait_for_lines(path: &Path, timeout: Duration) -> Result<Vec<String>> {
    let deadline = Instant::now() + timeout;

    while !path.exists() {
        if Instant::now() > deadline {
            bail!("timed out waiting for {}", path.display());
        }

        sleep(Duration::from_millis(10));
    }

    let text = fs::read_to_string(path)?;
    Ok(text.lines().map(str::to_owned).collect())
}
