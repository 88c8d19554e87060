use std::io;

use crate::{Deserialize, Serialize};

/// The message a worker sends to a broker to join the cluster.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Registration {
    /// The amount of workers this registrant contributes.
    #[serde(rename = "clientsSize")]
    pub clients_size: usize,
    /// A human readable tag for the registrant.
    pub identity: String,
    /// The port the worker listens on for peer to peer traffic.
    pub port: u16,
}

/// The parallel address lists inside a broker's reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LinkInfos {
    #[serde(rename = "ClientIps")]
    pub client_ips: Vec<String>,
    #[serde(rename = "ClientPorts")]
    pub client_ports: Vec<u16>,
}

/// The broker's reply once the whole fleet has registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Membership {
    pub linkinfos: LinkInfos,
}

impl Serialize for Registration {
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        serde_json::to_writer(buf, self)?;
        Ok(())
    }
}

impl Serialize for Membership {
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        serde_json::to_writer(buf, self)?;
        Ok(())
    }
}

impl Deserialize<'_> for Registration {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        Ok(serde_json::from_slice(buf)?)
    }
}

impl Deserialize<'_> for Membership {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        Ok(serde_json::from_slice(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_uses_broker_keys() {
        let registration = Registration {
            clients_size: 2,
            identity: "wk-a".into(),
            port: 9000,
        };

        let mut buf = Vec::new();
        registration.serialize(&mut buf).unwrap();

        let text = std::str::from_utf8(&buf).unwrap();
        assert_eq!(text, r#"{"clientsSize":2,"identity":"wk-a","port":9000}"#);
    }

    #[test]
    fn membership_from_broker_reply() {
        let reply = br#"{"linkinfos":{"ClientIps":["10.0.0.1","10.0.0.2"],"ClientPorts":[9000,9001]}}"#;
        let membership = Membership::deserialize(reply).unwrap();

        assert_eq!(membership.linkinfos.client_ips, ["10.0.0.1", "10.0.0.2"]);
        assert_eq!(membership.linkinfos.client_ports, [9000, 9001]);
    }

    #[test]
    fn truncated_reply_is_unexpected_eof() {
        let reply = br#"{"linkinfos":{"ClientIps":["10.0.0.1"],"#;
        let err = Membership::deserialize(reply).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn garbage_reply_is_invalid_data() {
        let err = Membership::deserialize(b"not json").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
