//! Command builders for the encoder and prober processes
//!
//! A GUI host on Windows would otherwise flash a console for every ffmpeg
//! launch and every duration probe.

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Launch without a console window (Windows only; elsewhere nothing changes)
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Blocking command, used by the ffprobe prober and the preflight check
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Async command, used for the supervised encoder
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_keep_program_and_start_without_args() {
        let std_cmd = std_command("/opt/ffmpeg/bin/ffprobe");
        assert_eq!(std_cmd.get_program(), OsStr::new("/opt/ffmpeg/bin/ffprobe"));
        assert_eq!(std_cmd.get_args().count(), 0);

        let tokio_cmd = tokio_command("ffmpeg");
        assert_eq!(tokio_cmd.as_std().get_program(), OsStr::new("ffmpeg"));
        assert_eq!(tokio_cmd.as_std().get_args().count(), 0);
    }
}
