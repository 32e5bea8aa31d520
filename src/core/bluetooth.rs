//! Bluetooth speaker sessions driven through `bluetoothctl` and `pactl`.
//!
//! ```text
//! UNKNOWN --scan--> DISCOVERED --pair+trust+connect--> CONNECTED --disconnect--> DISCOVERED
//! CONNECTED --bind sink--> CONNECTED (default audio output)
//! ```

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

use crate::adapters::{CommandOutput, CommandRunner};
use crate::config::BluetoothConfig;
use crate::core::identifier::DeviceIdentifier;
use crate::core::models::DeviceSessionState;
use crate::core::poll::{PollPolicy, poll_until};
use crate::core::state::StateStore;
use crate::error::DeviceError;
use crate::report::RunLog;

const BLUETOOTHCTL: &str = "bluetoothctl";
const PACTL: &str = "pactl";

static DEVICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Device ([0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5})(?: (.*))?$").expect("static regex")
});

/// A device the Bluetooth daemon knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownDevice {
    pub identifier: DeviceIdentifier,
    pub name: String,
}

/// Fields of `bluetoothctl info <address>` we act on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub paired: bool,
    pub trusted: bool,
    pub connected: bool,
}

impl DeviceInfo {
    pub fn link_status(&self) -> LinkStatus {
        if self.connected {
            LinkStatus::Connected
        } else if self.paired {
            LinkStatus::Paired
        } else {
            LinkStatus::Discovered
        }
    }
}

/// Ordered `Discovered < Paired < Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkStatus {
    Discovered,
    Paired,
    Connected,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovered => "DISCOVERED",
            Self::Paired => "PAIRED",
            Self::Connected => "CONNECTED",
        })
    }
}

/// Parse `Device <address> <name>` lines from `bluetoothctl devices` or scan output.
pub fn parse_devices(text: &str) -> Vec<KnownDevice> {
    let mut devices: Vec<KnownDevice> = Vec::new();
    for line in text.lines() {
        let Some(caps) = DEVICE_RE.captures(line.trim_end()) else {
            continue;
        };
        let Some(identifier) = caps.get(1).and_then(|m| m.as_str().parse().ok()) else {
            continue;
        };
        if devices.iter().any(|d| d.identifier == identifier) {
            continue;
        }
        let name = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| identifier.to_string());
        devices.push(KnownDevice { identifier, name });
    }
    devices
}

pub fn parse_info(text: &str) -> DeviceInfo {
    let mut info = DeviceInfo::default();
    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Name" => info.name = Some(value.to_string()),
            "Paired" => info.paired = value == "yes",
            "Trusted" => info.trusted = value == "yes",
            "Connected" => info.connected = value == "yes",
            _ => {}
        }
    }
    info
}

/// Name of the `bluez_*` sink carrying `id`, from `pactl list short sinks`.
pub fn find_sink(text: &str, id: &DeviceIdentifier) -> Option<String> {
    let fragment = id.sink_fragment();
    text.lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .find(|name| name.starts_with("bluez") && name.to_uppercase().contains(&fragment))
        .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub identifier: DeviceIdentifier,
    pub info: DeviceInfo,
    pub sink: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Overview {
    /// Highest status first; listing order within a status.
    pub devices: Vec<(KnownDevice, LinkStatus)>,
    pub default_sink: Option<String>,
    pub configured: Option<DeviceSessionState>,
}

pub struct SpeakerManager<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a BluetoothConfig,
    store: StateStore,
    policy: PollPolicy,
}

impl<'a> SpeakerManager<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a BluetoothConfig,
        store: StateStore,
    ) -> Self {
        Self {
            runner,
            config,
            store,
            policy: config.poll_policy(),
        }
    }

    /// Replace the settle/poll timing, e.g. to avoid sleeping in tests.
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn ctl(&self, args: &[&str]) -> Result<CommandOutput, DeviceError> {
        Ok(self.runner.run(BLUETOOTHCTL, args).await?)
    }

    async fn ctl_checked(&self, args: &[&str]) -> Result<CommandOutput, DeviceError> {
        let output = self.ctl(args).await?;
        if !output.success() {
            return Err(DeviceError::CommandFailed {
                command: format!("{} {}", BLUETOOTHCTL, args.join(" ")),
                reason: output.reason(),
            });
        }
        Ok(output)
    }

    /// Power the controller and register a default pairing agent.
    pub async fn setup(&self, log: &RunLog) -> Result<(), DeviceError> {
        for args in [
            &["power", "on"][..],
            &["agent", "on"][..],
            &["default-agent"][..],
            &["pairable", "on"][..],
        ] {
            self.ctl_checked(args).await?;
            log.info(format!("bluetoothctl {}: ok", args.join(" ")));
        }
        log.success("Bluetooth controller ready");
        Ok(())
    }

    /// Discover nearby devices for the configured scan window.
    ///
    /// Devices found by the scan itself are merged into the daemon's listing.
    pub async fn scan(&self, log: &RunLog) -> Result<Vec<KnownDevice>, DeviceError> {
        let timeout = self.config.scan_seconds.to_string();
        log.info(format!("Scanning for {}s", timeout));

        let scan = self.ctl_checked(&["--timeout", &timeout, "scan", "on"]).await?;
        let listing = self.ctl_checked(&["devices"]).await?;

        let mut devices = parse_devices(&listing.stdout);
        for found in parse_devices(&scan.stdout) {
            if !devices.iter().any(|d| d.identifier == found.identifier) {
                devices.push(found);
            }
        }

        Ok(devices)
    }

    pub async fn info(&self, id: &DeviceIdentifier) -> Result<DeviceInfo, DeviceError> {
        let output = self.ctl(&["info", id.as_str()]).await?;
        if !output.success() {
            debug!(identifier = %id, reason = %output.reason(), "Device unknown to daemon");
            return Ok(DeviceInfo::default());
        }
        Ok(parse_info(&output.stdout))
    }

    async fn is_connected(&self, id: &DeviceIdentifier) -> bool {
        self.info(id).await.map(|i| i.connected).unwrap_or(false)
    }

    /// Pair, trust and connect, then route audio to the speaker.
    pub async fn connect(
        &self,
        input: &str,
        log: &RunLog,
    ) -> Result<DeviceSessionState, DeviceError> {
        let id: DeviceIdentifier = input.parse()?;

        log.info(format!("Pairing with {}", id));
        let pair = self.ctl(&["pair", id.as_str()]).await?;
        if !pair.success() {
            let reason = pair.reason();
            if reason.contains("AlreadyExists") {
                debug!(identifier = %id, "Already paired");
            } else {
                log.warning(format!("Pairing with {} reported: {}", id, reason));
            }
        }

        let trust = self.ctl(&["trust", id.as_str()]).await?;
        if !trust.success() {
            log.warning(format!("Trusting {} reported: {}", id, trust.reason()));
        }

        log.info(format!("Connecting to {}", id));
        let connect = self.ctl(&["connect", id.as_str()]).await?;

        let this = self;
        let target = &id;
        let connected =
            poll_until(self.policy, move || async move { this.is_connected(target).await }).await;

        if !connected {
            let reason = if connect.success() {
                format!("not connected after {}s", self.policy.max_wait().as_secs())
            } else {
                connect.reason()
            };
            return Err(DeviceError::ConnectFailed {
                identifier: id.to_string(),
                reason,
            });
        }

        let info = self.info(&id).await?;
        let name = info.name.unwrap_or_else(|| id.to_string());
        log.success(format!("Connected to {} ({})", name, id));

        let sink = self.bind_sink(&id, log).await;
        let state = DeviceSessionState::new(id.to_string(), sink);
        self.store.save(&state)?;

        Ok(state)
    }

    /// Make the speaker's sink the default output. Best effort.
    async fn bind_sink(&self, id: &DeviceIdentifier, log: &RunLog) -> Option<String> {
        // The sink shows up shortly after the profile connects.
        let mut found = None;
        for attempt in 1..=self.policy.attempts {
            found = self.sink_for(id).await;
            if found.is_some() {
                break;
            }
            if attempt < self.policy.attempts && !self.policy.interval.is_zero() {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        let Some(sink) = found else {
            log.warning(format!("No audio sink appeared for {}; default output unchanged", id));
            return None;
        };

        match self.runner.run(PACTL, &["set-default-sink", &sink]).await {
            Ok(out) if out.success() => {
                log.info(format!("Default audio output set to {}", sink));
                Some(sink)
            }
            Ok(out) => {
                log.warning(format!("Could not set default sink {}: {}", sink, out.reason()));
                None
            }
            Err(e) => {
                log.warning(format!("Could not set default sink {}: {:#}", sink, e));
                None
            }
        }
    }

    async fn sink_for(&self, id: &DeviceIdentifier) -> Option<String> {
        let out = self.runner.run(PACTL, &["list", "short", "sinks"]).await.ok()?;
        if !out.success() {
            return None;
        }
        find_sink(&out.stdout, id)
    }

    async fn default_sink(&self) -> Option<String> {
        if let Ok(out) = self.runner.run(PACTL, &["get-default-sink"]).await {
            let name = out.stdout.trim();
            if out.success() && !name.is_empty() {
                return Some(name.to_string());
            }
        }

        let out = self.runner.run(PACTL, &["info"]).await.ok()?;
        out.stdout
            .lines()
            .find_map(|l| l.trim().strip_prefix("Default Sink:"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub async fn disconnect(&self, input: &str, log: &RunLog) -> Result<(), DeviceError> {
        let id: DeviceIdentifier = input.parse()?;

        log.info(format!("Disconnecting {}", id));
        let out = self.ctl(&["disconnect", id.as_str()]).await?;
        if !out.success() {
            debug!(identifier = %id, reason = %out.reason(), "disconnect reported failure");
        }

        let this = self;
        let target = &id;
        let released =
            poll_until(self.policy, move || async move { !this.is_connected(target).await })
                .await;

        if !released {
            return Err(DeviceError::DisconnectFailed {
                identifier: id.to_string(),
            });
        }

        log.success(format!("Disconnected {}", id));
        Ok(())
    }

    pub async fn device_status(&self, input: &str) -> Result<DeviceReport, DeviceError> {
        let id: DeviceIdentifier = input.parse()?;
        let info = self.info(&id).await?;
        let sink = if info.connected { self.sink_for(&id).await } else { None };
        Ok(DeviceReport {
            identifier: id,
            info,
            sink,
        })
    }

    pub async fn overview(&self) -> Result<Overview, DeviceError> {
        let listing = self.ctl_checked(&["devices"]).await?;

        let mut devices = Vec::new();
        for device in parse_devices(&listing.stdout) {
            let status = self.info(&device.identifier).await?.link_status();
            devices.push((device, status));
        }
        devices.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(Overview {
            devices,
            default_sink: self.default_sink().await,
            configured: self.store.load()?,
        })
    }

    pub fn configured(&self) -> Result<Option<DeviceSessionState>, DeviceError> {
        self.store.load()
    }

    pub fn reset(&self) -> Result<bool, DeviceError> {
        self.store.reset()
    }
}
