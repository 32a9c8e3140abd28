//! Open any supported device by kind, behind `dyn Spectrometer`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use ieapspect_core::error::{Error, Result};
use ieapspect_core::spectrometer::Spectrometer;

use crate::dummy::{DEFAULT_CHANNELS, DEFAULT_PERIOD, DummySpectrometer};

/// Device families this library can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    SerSpect,
    Sipos,
    Dm100,
    Spectrig,
    Dummy,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 5] = [
        DeviceKind::SerSpect,
        DeviceKind::Sipos,
        DeviceKind::Dm100,
        DeviceKind::Spectrig,
        DeviceKind::Dummy,
    ];

    /// Lowercase name, as accepted by [`FromStr`].
    pub const fn name(self) -> &'static str {
        match self {
            DeviceKind::SerSpect => "serspect",
            DeviceKind::Sipos => "sipos",
            DeviceKind::Dm100 => "dm100",
            DeviceKind::Spectrig => "spectrig",
            DeviceKind::Dummy => "dummy",
        }
    }

    /// Whether the driver for this kind was compiled in.
    pub const fn is_available(self) -> bool {
        match self {
            DeviceKind::SerSpect => cfg!(feature = "serspect"),
            DeviceKind::Sipos => cfg!(feature = "sipos"),
            DeviceKind::Dm100 => cfg!(feature = "dm100"),
            DeviceKind::Spectrig => cfg!(feature = "spectrig"),
            DeviceKind::Dummy => true,
        }
    }

    /// Kinds whose drivers were compiled in.
    pub fn available() -> Vec<DeviceKind> {
        Self::ALL.into_iter().filter(|k| k.is_available()).collect()
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidParameter(format!("unknown device kind '{s}'")))
    }
}

/// Overrides applied on top of each driver's defaults.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Serial port for serial devices; found by USB description when unset.
    pub port: Option<String>,
    /// Helper program for helper-backed devices.
    pub program: Option<String>,
    /// Deadline for request/response exchanges, where the device has them.
    pub response_timeout: Option<Duration>,
    /// Event period of the simulated device.
    pub dummy_period: Duration,
    /// Channel count of the simulated device.
    pub dummy_channels: u32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            port: None,
            program: None,
            response_timeout: None,
            dummy_period: DEFAULT_PERIOD,
            dummy_channels: DEFAULT_CHANNELS,
        }
    }
}

/// Connect to a device of `kind`.
///
/// Fails with [`Error::Unsupported`] if the kind's driver was not compiled
/// in.
pub async fn connect(kind: DeviceKind, opts: &ConnectOptions) -> Result<Box<dyn Spectrometer>> {
    tracing::debug!(%kind, "connecting");
    match kind {
        #[cfg(feature = "serspect")]
        DeviceKind::SerSpect => {
            let mut builder = ieapspect_serspect::SerSpectBuilder::new();
            if let Some(port) = &opts.port {
                builder = builder.serial_port(port);
            }
            if let Some(limit) = opts.response_timeout {
                builder = builder.response_timeout(limit);
            }
            Ok(Box::new(builder.build().await?))
        }
        #[cfg(feature = "sipos")]
        DeviceKind::Sipos => {
            let mut builder = ieapspect_sipos::SiposBuilder::new();
            if let Some(port) = &opts.port {
                builder = builder.serial_port(port);
            }
            Ok(Box::new(builder.build().await?))
        }
        #[cfg(feature = "dm100")]
        DeviceKind::Dm100 => {
            let mut builder = ieapspect_dm100::Dm100Builder::new();
            if let Some(program) = &opts.program {
                builder = builder.program(program);
            }
            Ok(Box::new(builder.build().await?))
        }
        #[cfg(feature = "spectrig")]
        DeviceKind::Spectrig => {
            let mut builder = ieapspect_spectrig::SpectrigBuilder::new();
            if let Some(program) = &opts.program {
                builder = builder.program(program);
            }
            Ok(Box::new(builder.build().await?))
        }
        DeviceKind::Dummy => Ok(Box::new(DummySpectrometer::new(
            opts.dummy_period,
            opts.dummy_channels,
        ))),
        #[allow(unreachable_patterns)]
        other => Err(Error::Unsupported(format!(
            "driver for {other} not compiled in"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_from_their_names() {
        for kind in DeviceKind::ALL {
            assert_eq!(kind.name().parse::<DeviceKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.name());
        }
        assert_eq!("DM100".parse::<DeviceKind>().unwrap(), DeviceKind::Dm100);
        assert!(matches!(
            "ftdx10".parse::<DeviceKind>(),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn dummy_is_always_available() {
        assert!(DeviceKind::available().contains(&DeviceKind::Dummy));
    }

    #[tokio::test]
    async fn connect_dummy() {
        let opts = ConnectOptions {
            dummy_period: Duration::from_millis(1),
            dummy_channels: 256,
            ..Default::default()
        };
        let spect = connect(DeviceKind::Dummy, &opts).await.unwrap();
        assert_eq!(spect.info().driver, "Dummy");
        assert_eq!(spect.info().channels, 256);
        let event = spect.next_event().await.unwrap();
        assert!(event.value >= 1 && event.value <= 256);
        spect.close().await.unwrap();
    }

    #[cfg(feature = "dm100")]
    #[tokio::test]
    async fn missing_helper_program_fails() {
        let opts = ConnectOptions {
            program: Some("/nonexistent/ieapspect-helper".into()),
            ..Default::default()
        };
        assert!(connect(DeviceKind::Dm100, &opts).await.is_err());
    }
}
