use crate::Error;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

pub const DEFAULT_P2P_PORT: u16 = 30303;

const ENODE_SCHEME: &str = "enode://";
const PUBKEY_HEX_LEN: usize = 128;

/// A v4 enode URL: `enode://<pubkey>@<ip>:<tcp>[?discport=<udp>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enode {
    pub pubkey: String,
    pub ip: IpAddr,
    pub tcp_port: u16,
    pub udp_port: u16,
}

impl Enode {
    pub fn with_ip(self, ip: IpAddr) -> Self {
        Self { ip, ..self }
    }
}

impl FromStr for Enode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidEnode(format!("{}: {}", reason, s));

        let rest = s
            .strip_prefix(ENODE_SCHEME)
            .ok_or_else(|| invalid("missing enode scheme"))?;
        let (pubkey, rest) = rest
            .split_once('@')
            .ok_or_else(|| invalid("missing host"))?;
        if pubkey.len() != PUBKEY_HEX_LEN || hex::decode(pubkey).is_err() {
            return Err(invalid("invalid public key"));
        }

        let (address, query) = match rest.split_once('?') {
            Some((address, query)) => (address, Some(query)),
            None => (rest, None),
        };
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (address, None),
        };
        let ip = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map_err(|_| invalid("invalid ip"))?;
        let tcp_port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("invalid port"))?,
            None => 0,
        };

        let mut udp_port = tcp_port;
        if let Some(query) = query {
            for pair in query.split('&') {
                if let Some(value) = pair.strip_prefix("discport=") {
                    udp_port = value
                        .parse::<u16>()
                        .map_err(|_| invalid("invalid discport"))?;
                }
            }
        }

        Ok(Self {
            pubkey: pubkey.to_lowercase(),
            ip,
            tcp_port: if tcp_port == 0 { DEFAULT_P2P_PORT } else { tcp_port },
            udp_port: if udp_port == 0 { DEFAULT_P2P_PORT } else { udp_port },
        })
    }
}

impl fmt::Display for Enode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = match self.ip {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{}]", ip),
        };
        write!(f, "{}{}@{}:{}", ENODE_SCHEME, self.pubkey, host, self.tcp_port)?;
        if self.udp_port != self.tcp_port {
            write!(f, "?discport={}", self.udp_port)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pubkey() -> String {
        "ab".repeat(64)
    }

    #[test]
    fn parse_and_print() {
        let url = format!("enode://{}@10.0.0.2:30304?discport=30305", pubkey());
        let enode = url.parse::<Enode>().unwrap();
        assert_eq!(enode.ip, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(enode.tcp_port, 30304);
        assert_eq!(enode.udp_port, 30305);
        assert_eq!(enode.to_string(), url);
    }

    #[test]
    fn zero_ports_default() {
        let enode = format!("enode://{}@127.0.0.1:0", pubkey())
            .parse::<Enode>()
            .unwrap();
        assert_eq!(enode.tcp_port, DEFAULT_P2P_PORT);
        assert_eq!(enode.udp_port, DEFAULT_P2P_PORT);
        assert_eq!(
            enode.to_string(),
            format!("enode://{}@127.0.0.1:30303", pubkey())
        );
    }

    #[test]
    fn replace_ip() {
        let enode = format!("enode://{}@127.0.0.1:30303", pubkey())
            .parse::<Enode>()
            .unwrap()
            .with_ip("172.17.0.3".parse().unwrap());
        assert_eq!(
            enode.to_string(),
            format!("enode://{}@172.17.0.3:30303", pubkey())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!("http://x".parse::<Enode>().is_err());
        assert!("enode://abcd@127.0.0.1:1".parse::<Enode>().is_err());
        assert!(format!("enode://{}@host:1", pubkey())
            .parse::<Enode>()
            .is_err());
    }
}
