//! IPv4 CIDR arithmetic for carving subnets out of the VPC range

use std::fmt;
use std::net::Ipv4Addr;

use quay_core::schema::validate_cidr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn parse(s: &str) -> Result<Self, String> {
        validate_cidr(s)?;
        let (ip, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("Invalid CIDR format '{}'", s))?;
        let addr: Ipv4Addr = ip
            .parse()
            .map_err(|_| format!("Invalid IP address '{}'", ip))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("Invalid prefix length '{}'", prefix))?;

        let network = u32::from(addr);
        if network & !mask(prefix) != 0 {
            return Err(format!(
                "'{}' has host bits set; did you mean {}?",
                s,
                Ipv4Cidr {
                    network: network & mask(prefix),
                    prefix
                }
            ));
        }
        Ok(Self { network, prefix })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The first `count` consecutive subnets of size `/new_prefix`
    pub fn subnets(&self, new_prefix: u8, count: usize) -> Result<Vec<Ipv4Cidr>, String> {
        if new_prefix < self.prefix || new_prefix > 28 {
            return Err(format!(
                "/{} subnets cannot be carved from a /{} network (allowed: /{} to /28)",
                new_prefix, self.prefix, self.prefix
            ));
        }
        let available = 1u64 << (new_prefix - self.prefix);
        if count as u64 > available {
            return Err(format!(
                "{} /{} subnets do not fit in {} (room for {})",
                count, new_prefix, self, available
            ));
        }
        let size = 1u64 << (32 - new_prefix);
        Ok((0..count as u64)
            .map(|i| Ipv4Cidr {
                network: (self.network as u64 + i * size) as u32,
                prefix: new_prefix,
            })
            .collect())
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.prefix)
    }
}
