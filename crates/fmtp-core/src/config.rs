use std::{net::IpAddr, ops::RangeInclusive, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{DataEncoding, Error};

const PORT_RANGE: RangeInclusive<u32> = 2001..=65534;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Server,
}

/// State a channel settles in after start.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialState {
    #[default]
    DataReady,
    Disabled,
}

/// Settings of one channel as delivered by the configuration distributor.
///
/// Nothing is validated until [`ChannelSettings::check`] turns them into a [`ChannelConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub id: u32,
    pub data_type: String,
    pub net_role: String,
    pub local_name: String,
    pub local_atc: String,
    pub remote_name: String,
    pub remote_atc: String,
    /// Seconds
    pub interval_ts: u64,
    /// Seconds
    pub interval_tr: u64,
    /// Seconds
    pub interval_ti: u64,
    /// Seconds
    pub reconnect_timeout: u64,
    pub local_port: u32,
    pub remote_address: String,
    pub remote_port: u32,
    /// Only accept server connections from this address.
    pub client_ip: Option<String>,
    pub data_encoding: String,
    pub debug: bool,
    pub initial_state: InitialState,
}

/// Where the channel's transport connects to or listens on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Connect { address: String, port: u16 },
    Listen {
        port: u16,
        client_ip: Option<IpAddr>,
    },
}

/// Validated channel configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub id: u32,
    pub data_type: String,
    pub role: Role,
    pub local_name: String,
    pub local_atc: String,
    pub remote_name: String,
    pub remote_atc: String,
    pub ts: Duration,
    pub tr: Duration,
    pub ti: Duration,
    pub reconnect_timeout: Duration,
    pub endpoint: Endpoint,
    pub encoding: DataEncoding,
    pub debug: bool,
    pub initial_state: InitialState,
}

impl ChannelConfig {
    /// `tcp://host:port` of the peer (client) or the listening socket (server).
    #[must_use]
    pub fn url(&self) -> String {
        match &self.endpoint {
            Endpoint::Connect { address, port } => format!("tcp://{address}:{port}"),
            Endpoint::Listen { port, .. } => format!("tcp://0.0.0.0:{port}"),
        }
    }
}

fn port(field: &'static str, port: u32) -> Result<u16, Error> {
    if PORT_RANGE.contains(&port) {
        u16::try_from(port).map_err(|_| Error::InvalidPort { field, port })
    } else {
        Err(Error::InvalidPort { field, port })
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<String, Error> {
    if value.trim().is_empty() {
        Err(Error::EmptyName(field))
    } else {
        Ok(value.to_string())
    }
}

impl ChannelSettings {
    /// Validates the settings before a channel may be started.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn check(&self) -> Result<ChannelConfig, Error> {
        if self.data_type.trim().is_empty() {
            return Err(Error::EmptyDataType);
        }
        let role = match self.net_role.as_str() {
            "client" => Role::Client,
            "server" => Role::Server,
            other => return Err(Error::InvalidRole(other.to_string())),
        };
        let local_name = non_empty("local name", &self.local_name)?;
        let local_atc = non_empty("local ATC", &self.local_atc)?;
        let remote_name = non_empty("remote name", &self.remote_name)?;
        let remote_atc = non_empty("remote ATC", &self.remote_atc)?;

        if self.interval_ts == 0 || self.interval_ts >= self.interval_tr {
            return Err(Error::InvalidTimers {
                ts: self.interval_ts,
                tr: self.interval_tr,
            });
        }
        if self.interval_ti == 0 {
            return Err(Error::ZeroInterval("Ti"));
        }
        if self.reconnect_timeout == 0 {
            return Err(Error::ZeroInterval("reconnect timeout"));
        }

        let endpoint = match role {
            Role::Server => Endpoint::Listen {
                port: port("local port", self.local_port)?,
                client_ip: self
                    .client_ip
                    .as_deref()
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
                    .map(|ip| {
                        ip.parse()
                            .map_err(|_| Error::InvalidClientIp(ip.to_string()))
                    })
                    .transpose()?,
            },
            Role::Client => {
                if self.remote_address.trim().is_empty() {
                    return Err(Error::EmptyRemoteAddress);
                }
                Endpoint::Connect {
                    address: self.remote_address.trim().to_string(),
                    port: port("remote port", self.remote_port)?,
                }
            }
        };

        if self.data_encoding.trim().is_empty() {
            return Err(Error::EmptyEncoding);
        }
        let encoding = DataEncoding::from_label(&self.data_encoding)?;

        Ok(ChannelConfig {
            id: self.id,
            data_type: self.data_type.clone(),
            role,
            local_name,
            local_atc,
            remote_name,
            remote_atc,
            ts: Duration::from_secs(self.interval_ts),
            tr: Duration::from_secs(self.interval_tr),
            ti: Duration::from_secs(self.interval_ti),
            reconnect_timeout: Duration::from_secs(self.reconnect_timeout),
            endpoint,
            encoding,
            debug: self.debug,
            initial_state: self.initial_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ChannelSettings {
        ChannelSettings {
            id: 7,
            data_type: "OLDI".into(),
            net_role: "client".into(),
            local_name: "Local".into(),
            local_atc: "LOCAL".into(),
            remote_name: "Remote".into(),
            remote_atc: "REMOTE".into(),
            interval_ts: 15,
            interval_tr: 40,
            interval_ti: 30,
            reconnect_timeout: 5,
            local_port: 0,
            remote_address: "10.0.0.1".into(),
            remote_port: 8500,
            client_ip: None,
            data_encoding: "UTF-8".into(),
            debug: false,
            initial_state: InitialState::DataReady,
        }
    }

    fn server() -> ChannelSettings {
        ChannelSettings {
            net_role: "server".into(),
            local_port: 8500,
            remote_address: String::new(),
            remote_port: 0,
            ..client()
        }
    }

    #[test]
    fn accepts_valid_settings() {
        let config = client().check().unwrap();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.ts, Duration::from_secs(15));
        assert_eq!(config.url(), "tcp://10.0.0.1:8500");

        let config = server().check().unwrap();
        let listen = Endpoint::Listen {
            port: 8500,
            client_ip: None,
        };
        assert_eq!(config.endpoint, listen);
        assert_eq!(config.url(), "tcp://0.0.0.0:8500");
    }

    #[test]
    fn rejects_missing_fields() {
        let cases = [
            (
                ChannelSettings {
                    data_type: String::new(),
                    ..client()
                },
                Error::EmptyDataType,
            ),
            (
                ChannelSettings {
                    local_name: String::new(),
                    ..client()
                },
                Error::EmptyName("local name"),
            ),
            (
                ChannelSettings {
                    local_atc: " ".into(),
                    ..client()
                },
                Error::EmptyName("local ATC"),
            ),
            (
                ChannelSettings {
                    remote_name: String::new(),
                    ..client()
                },
                Error::EmptyName("remote name"),
            ),
            (
                ChannelSettings {
                    remote_atc: String::new(),
                    ..client()
                },
                Error::EmptyName("remote ATC"),
            ),
            (
                ChannelSettings {
                    data_encoding: String::new(),
                    ..client()
                },
                Error::EmptyEncoding,
            ),
        ];
        for (settings, expected) in cases {
            assert_eq!(settings.check().unwrap_err(), expected);
        }
    }

    #[test]
    fn rejects_unknown_role() {
        for role in ["", "Server", "peer"] {
            let settings = ChannelSettings {
                net_role: role.into(),
                ..client()
            };
            let expected = Error::InvalidRole(role.into());
            assert_eq!(settings.check().unwrap_err(), expected);
        }
    }

    #[test]
    fn ts_must_be_lower_than_tr() {
        let equal = ChannelSettings {
            interval_ts: 40,
            ..client()
        };
        let expected = Error::InvalidTimers { ts: 40, tr: 40 };
        assert_eq!(equal.check().unwrap_err(), expected);
        let greater = ChannelSettings {
            interval_ts: 50,
            ..client()
        };
        assert!(greater.check().is_err());
        let zero = ChannelSettings {
            interval_ts: 0,
            ..client()
        };
        assert!(zero.check().is_err());
    }

    #[test]
    fn ti_and_reconnect_timeout_must_be_set() {
        let settings = ChannelSettings {
            interval_ti: 0,
            ..client()
        };
        assert_eq!(settings.check().unwrap_err(), Error::ZeroInterval("Ti"));
        let settings = ChannelSettings {
            reconnect_timeout: 0,
            ..server()
        };
        let expected = Error::ZeroInterval("reconnect timeout");
        assert_eq!(settings.check().unwrap_err(), expected);

        // left out of the document
        let settings: ChannelSettings = serde_json::from_str(
            r#"{
                "data_type": "OLDI",
                "net_role": "client",
                "local_name": "Local",
                "local_atc": "LOCAL",
                "remote_name": "Remote",
                "remote_atc": "REMOTE",
                "interval_ts": 15,
                "interval_tr": 40,
                "interval_ti": 30,
                "remote_address": "10.0.0.1",
                "remote_port": 8500,
                "data_encoding": "utf-8"
            }"#,
        )
        .unwrap();
        assert_eq!(settings.check().unwrap_err(), expected);
    }

    #[test]
    fn server_port_bounds() {
        for port in [0, 2000, 65535, 70000] {
            let settings = ChannelSettings {
                local_port: port,
                ..server()
            };
            let expected = Error::InvalidPort {
                field: "local port",
                port,
            };
            assert_eq!(settings.check().unwrap_err(), expected);
        }
        for port in [2001, 65534] {
            let settings = ChannelSettings {
                local_port: port,
                ..server()
            };
            assert!(settings.check().is_ok());
        }
    }

    #[test]
    fn client_endpoint_rules() {
        let settings = ChannelSettings {
            remote_address: String::new(),
            ..client()
        };
        assert_eq!(settings.check().unwrap_err(), Error::EmptyRemoteAddress);
        for port in [2000, 65535] {
            let settings = ChannelSettings {
                remote_port: port,
                ..client()
            };
            let expected = Error::InvalidPort {
                field: "remote port",
                port,
            };
            assert_eq!(settings.check().unwrap_err(), expected);
        }
    }

    #[test]
    fn client_ip_must_parse() {
        let settings = ChannelSettings {
            client_ip: Some("10.1.1.1".into()),
            ..server()
        };
        let Endpoint::Listen { client_ip, .. } = settings.check().unwrap().endpoint else {
            panic!("server must listen");
        };
        assert_eq!(client_ip, Some("10.1.1.1".parse().unwrap()));

        let settings = ChannelSettings {
            client_ip: Some("nope".into()),
            ..server()
        };
        let expected = Error::InvalidClientIp("nope".into());
        assert_eq!(settings.check().unwrap_err(), expected);
    }

    #[test]
    fn deserializes_from_json() {
        let settings: ChannelSettings = serde_json::from_str(
            r#"{
                "id": 3,
                "data_type": "AODB",
                "net_role": "server",
                "local_name": "Minsk",
                "local_atc": "UMMS",
                "remote_name": "Vilnius",
                "remote_atc": "EYVL",
                "interval_ts": 15,
                "interval_tr": 40,
                "interval_ti": 30,
                "reconnect_timeout": 5,
                "local_port": 8500,
                "data_encoding": "windows-1251",
                "initial_state": "disabled"
            }"#,
        )
        .unwrap();
        let config = settings.check().unwrap();
        assert_eq!(config.encoding, DataEncoding::Windows1251);
        assert_eq!(config.initial_state, InitialState::Disabled);
        assert!(!config.debug);
    }
}
