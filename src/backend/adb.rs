//! Source transport over the `adb` command-line tool.

use std::path::Path;
use tracing::debug;

use super::command::run_command;
use super::{BackendError, ConnectedSource, ConnectionType, DeviceBackend, SourceFile};

const ADB: &str = "adb";

/// Drives `adb` for device enumeration, listing and pulling.
#[derive(Debug, Clone, Default)]
pub struct AdbDevice;

impl AdbDevice {
    pub fn new() -> Self {
        Self
    }

    /// Connect to a device over Wi-Fi.
    pub fn connect(&self, ip: &str, port: u16) -> Result<(), BackendError> {
        let addr = format!("{ip}:{port}");
        let output = run_command(ADB, &["connect", &addr])?.into_result()?;
        if output.contains("connected") {
            Ok(())
        } else {
            Err(BackendError::Unavailable(format!(
                "adb connect {addr}: {}",
                output.trim()
            )))
        }
    }
}

impl DeviceBackend for AdbDevice {
    fn connected_sources(&self) -> Result<Vec<ConnectedSource>, BackendError> {
        let output = run_command(ADB, &["devices", "-l"])?.into_result()?;
        Ok(parse_device_list(&output))
    }

    fn list_files(
        &self,
        source_id: &str,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<SourceFile>, BackendError> {
        let script = list_script(path, recursive);
        let output = run_command(ADB, &["-s", source_id, "shell", &script])?;

        if !output.success && output.text.contains("No such file") {
            debug!(source_id, path, "media path missing on device");
            return Ok(Vec::new());
        }
        let text = output.into_result()?;
        Ok(parse_stat_output(&text))
    }

    fn copy_to_local(
        &self,
        source_id: &str,
        source_path: &str,
        local_path: &Path,
    ) -> Result<(), BackendError> {
        let local = local_path.to_string_lossy();
        run_command(ADB, &["-s", source_id, "pull", source_path, &local])?.into_result()?;
        Ok(())
    }
}

/// Device-side shell command printing `size mtime path` for every file
/// under `path`.
fn list_script(path: &str, recursive: bool) -> String {
    let depth = if recursive { "" } else { " -maxdepth 1" };
    format!(
        "find {}{depth} -type f -exec stat -c '%s %Y %n' {{}} +",
        shell_quote(path)
    )
}

/// Single-quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Parse `adb devices -l`.
pub fn parse_device_list(output: &str) -> Vec<ConnectedSource> {
    let mut sources = Vec::new();

    for line in output.lines() {
        if line.starts_with("List of") || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }

        let id = fields[0].to_string();
        let connection = if id.contains(':') {
            ConnectionType::Wifi
        } else {
            ConnectionType::Usb
        };
        let mut source = ConnectedSource {
            id,
            state: fields[1].to_string(),
            connection,
            model: None,
            product: None,
            transport_id: None,
        };

        for field in &fields[2..] {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            match key {
                "model" => source.model = Some(value.to_string()),
                "product" => source.product = Some(value.to_string()),
                "transport_id" => source.transport_id = Some(value.to_string()),
                _ => {}
            }
        }
        sources.push(source);
    }

    sources
}

/// Parse `stat -c '%s %Y %n'` lines: size, mtime epoch, full path.
/// Unparsable lines are dropped.
pub fn parse_stat_output(output: &str) -> Vec<SourceFile> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let mut parts = line.splitn(3, ' ');
            let size = parts.next()?.parse::<u64>().ok()?;
            let mtime = parts.next()?.parse::<i64>().ok()?;
            let path = parts.next()?.trim_end_matches('\r');
            if path.is_empty() {
                return None;
            }
            Some(SourceFile::new(path.replace('\\', "/"), size, mtime))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_list() {
        let output = "List of devices attached\n\
                      1WMHH815X1234   device usb:1-1 product:hollywood model:Quest_2 device:hollywood transport_id:3\n\
                      192.168.1.20:5555 offline\n\
                      \n";
        let sources = parse_device_list(output);
        assert_eq!(sources.len(), 2);

        assert_eq!(sources[0].id, "1WMHH815X1234");
        assert!(sources[0].is_online());
        assert_eq!(sources[0].connection, ConnectionType::Usb);
        assert_eq!(sources[0].model.as_deref(), Some("Quest_2"));
        assert_eq!(sources[0].product.as_deref(), Some("hollywood"));
        assert_eq!(sources[0].transport_id.as_deref(), Some("3"));

        assert_eq!(sources[1].connection, ConnectionType::Wifi);
        assert!(!sources[1].is_online());
    }

    #[test]
    fn test_parse_stat_output() {
        let output = "1048576 1700000000 /sdcard/Oculus/VideoShots/clip one.mp4\r\n\
                      garbage line\n\
                      2048 1700000100 /sdcard/Oculus/Screenshots/shot.jpg\n";
        let files = parse_stat_output(output);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "/sdcard/Oculus/VideoShots/clip one.mp4");
        assert_eq!(files[0].size, 1_048_576);
        assert_eq!(files[0].mtime(), 1_700_000_000);
        assert_eq!(files[1].file_name(), "shot.jpg");
    }

    #[test]
    fn test_list_script_quotes_path() {
        assert_eq!(
            list_script("/sdcard/My Videos/", true),
            "find '/sdcard/My Videos/' -type f -exec stat -c '%s %Y %n' {} +"
        );
        assert_eq!(
            list_script("/sdcard/DCIM", false),
            "find '/sdcard/DCIM' -maxdepth 1 -type f -exec stat -c '%s %Y %n' {} +"
        );
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's; rm -rf /"), r"'it'\''s; rm -rf /'");
        assert_eq!(shell_quote("$(id)"), "'$(id)'");
    }

    #[test]
    fn test_parse_stat_output_empty() {
        assert!(parse_stat_output("").is_empty());
    }
}
