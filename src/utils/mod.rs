use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Maximum interface name length on Linux
const IFNAME_MAX: usize = 15;

/// A CIDR network block, family-agnostic.
/// IPv4 addresses live in the low 32 bits of `network`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrBlock {
    pub family: u8,
    pub network: u128,
    pub prefix_len: u8,
}

impl CidrBlock {
    /// Parse a CIDR string (e.g. "172.30.0.0/16" or "2a03:2260::/32").
    /// Host bits below the prefix length are zeroed.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (family, addr, prefix_len) = parse_ip_cidr(s)?;
        let max_len = if family == 4 { 32 } else { 128 };
        let mask = prefix_mask(max_len, prefix_len);
        Ok(Self {
            family,
            network: addr & mask,
            prefix_len,
        })
    }

    pub fn max_len(&self) -> u8 {
        if self.family == 4 {
            32
        } else {
            128
        }
    }

    fn host_bits(&self) -> u32 {
        u32::from(self.max_len() - self.prefix_len)
    }

    /// Highest address contained in this block
    pub fn last(&self) -> u128 {
        if self.host_bits() >= 128 {
            return u128::MAX;
        }
        self.network | ((1u128 << self.host_bits()) - 1)
    }

    /// True if `other` is fully contained within this block
    pub fn contains(&self, other: &CidrBlock) -> bool {
        self.family == other.family
            && other.prefix_len >= self.prefix_len
            && other.network >= self.network
            && other.last() <= self.last()
    }

    /// Host address at `offset` from the network address, without mask
    pub fn host(&self, offset: u128) -> String {
        format_ip(self.family, self.network + offset)
    }

    /// Host address at `offset`, formatted with this block's prefix length
    pub fn host_cidr(&self, offset: u128) -> String {
        format!("{}/{}", self.host(offset), self.prefix_len)
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", format_ip(self.family, self.network), self.prefix_len)
    }
}

/// Parse "addr/len", keeping host bits (an interface address, not a network).
/// Returns (family, address, prefix_len).
pub fn parse_ip_cidr(s: &str) -> Result<(u8, u128, u8), String> {
    let (addr_part, len_part) = s
        .split_once('/')
        .ok_or_else(|| format!("Invalid CIDR '{}': missing prefix length", s))?;
    let prefix_len: u8 = len_part
        .parse()
        .map_err(|_| format!("Invalid prefix length in '{}'", s))?;

    if addr_part.contains(':') {
        let addr: Ipv6Addr = addr_part
            .parse()
            .map_err(|_| format!("Invalid IPv6 address in '{}'", s))?;
        if prefix_len > 128 {
            return Err(format!("Prefix length out of range in '{}'", s));
        }
        Ok((6, u128::from(addr), prefix_len))
    } else {
        let addr: Ipv4Addr = addr_part
            .parse()
            .map_err(|_| format!("Invalid IPv4 address in '{}'", s))?;
        if prefix_len > 32 {
            return Err(format!("Prefix length out of range in '{}'", s));
        }
        Ok((4, u128::from(u32::from(addr)), prefix_len))
    }
}

/// Format a numeric address back into dotted-quad or RFC 5952 form
pub fn format_ip(family: u8, value: u128) -> String {
    if family == 4 {
        Ipv4Addr::from(value as u32).to_string()
    } else {
        Ipv6Addr::from(value).to_string()
    }
}

fn prefix_mask(max_len: u8, prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        return 0;
    }
    let host = u32::from(max_len - prefix_len);
    if host >= 128 {
        0
    } else {
        !((1u128 << host) - 1)
    }
}

/// Decompose the unallocated space of `container` into maximal CIDR-aligned
/// blocks, ascending by address. `allocated` blocks outside the container
/// are ignored; overlaps are tolerated.
pub fn free_subranges(container: &CidrBlock, allocated: &[CidrBlock]) -> Vec<CidrBlock> {
    let mut taken: Vec<(u128, u128)> = allocated
        .iter()
        .filter(|a| a.family == container.family && container.contains(a))
        .map(|a| (a.network, a.last()))
        .collect();
    taken.sort_unstable();

    let mut out = Vec::new();
    let mut cursor = container.network;
    let end = container.last();

    for (start, last) in taken {
        if start > cursor {
            push_aligned_blocks(container.family, cursor, start - 1, &mut out);
        }
        cursor = match last.checked_add(1) {
            Some(next) => cursor.max(next),
            None => return out,
        };
    }
    if cursor <= end {
        push_aligned_blocks(container.family, cursor, end, &mut out);
    }

    out
}

/// Split the inclusive range [start, end] into maximal aligned CIDR blocks
fn push_aligned_blocks(family: u8, mut start: u128, end: u128, out: &mut Vec<CidrBlock>) {
    let max_len: u8 = if family == 4 { 32 } else { 128 };
    while start <= end {
        let span = end - start + 1;
        // Largest power of two <= span
        let mut size = 1u128 << (127 - span.leading_zeros());
        // Alignment constraint at the range start
        if start != 0 {
            let align = start & start.wrapping_neg();
            if align < size {
                size = align;
            }
        }
        let prefix_len = max_len - size.trailing_zeros() as u8;
        out.push(CidrBlock {
            family,
            network: start,
            prefix_len,
        });
        start = match start.checked_add(size) {
            Some(next) => next,
            None => break,
        };
    }
}

/// First free block of exactly `desired_len` within `container`, or None
/// when no remaining gap is large enough.
pub fn first_fit(
    container: &CidrBlock,
    allocated: &[CidrBlock],
    desired_len: u8,
) -> Option<CidrBlock> {
    free_subranges(container, allocated)
        .into_iter()
        .find(|r| r.prefix_len <= desired_len)
        .map(|r| CidrBlock {
            family: r.family,
            network: r.network,
            prefix_len: desired_len,
        })
}

/// Strip a trailing ".<domain>" from a node name, if present
pub fn strip_domain(name: &str, domain: &str) -> String {
    let suffix = format!(".{}", domain);
    name.strip_suffix(&suffix).unwrap_or(name).to_string()
}

/// Derive the tunnel interface name for one end of a tunnel from the
/// *remote* peer's name: "wg-" (or "oob-" for management tunnels) plus the
/// peer's host label with dots replaced, truncated to the kernel limit.
pub fn tunnel_interface_name(peer_name: &str, domain: &str, oobm: bool) -> String {
    let prefix = if oobm { "oob" } else { "wg" };
    let host = strip_domain(peer_name, domain).replace('.', "-");
    let mut name = format!("{}-{}", prefix, host);
    name.truncate(IFNAME_MAX);
    name
}

/// Description string identifying a transfer prefix by its two endpoints
pub fn transfer_prefix_description(server: &str, client: &str, domain: &str) -> String {
    format!(
        "{} <-> {}",
        strip_domain(server, domain),
        strip_domain(client, domain)
    )
}

/// Parse a space-separated "<pole>:<count>" surge layout string
pub fn parse_pole_layout(s: &str) -> Result<Vec<(String, u32)>, String> {
    let mut out = Vec::new();
    for token in s.split_whitespace() {
        let (pole, count) = token
            .split_once(':')
            .ok_or_else(|| format!("Invalid pole token '{}': expected <pole>:<count>", token))?;
        let count: u32 = count
            .parse()
            .map_err(|_| format!("Invalid surge count in '{}'", token))?;
        if pole.is_empty() || count == 0 {
            return Err(format!("Invalid pole token '{}'", token));
        }
        out.push((pole.to_string(), count));
    }
    if out.is_empty() {
        return Err("Pole layout is empty".to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> CidrBlock {
        CidrBlock::parse(s).unwrap()
    }

    #[test]
    fn test_parse_cidr_v4() {
        let b = cidr("172.30.7.0/24");
        assert_eq!(b.family, 4);
        assert_eq!(b.prefix_len, 24);
        assert_eq!(b.to_string(), "172.30.7.0/24");
    }

    #[test]
    fn test_parse_cidr_zeroes_host_bits() {
        assert_eq!(cidr("10.0.0.5/24").to_string(), "10.0.0.0/24");
        assert_eq!(cidr("fd00::1/64").to_string(), "fd00::/64");
    }

    #[test]
    fn test_parse_cidr_rejects_garbage() {
        assert!(CidrBlock::parse("10.0.0.0").is_err());
        assert!(CidrBlock::parse("10.0.0.0/33").is_err());
        assert!(CidrBlock::parse("fd00::/129").is_err());
        assert!(CidrBlock::parse("not-a-prefix/24").is_err());
    }

    #[test]
    fn test_contains() {
        let parent = cidr("10.0.0.0/16");
        assert!(parent.contains(&cidr("10.0.3.0/24")));
        assert!(!parent.contains(&cidr("10.1.0.0/24")));
        assert!(!parent.contains(&cidr("10.0.0.0/8")));
    }

    #[test]
    fn test_host_cidr() {
        let b = cidr("10.1.1.0/31");
        assert_eq!(b.host_cidr(0), "10.1.1.0/31");
        assert_eq!(b.host_cidr(1), "10.1.1.1/31");

        let b6 = cidr("fd00::/64");
        assert_eq!(b6.host_cidr(1), "fd00::1/64");
        assert_eq!(b6.host_cidr(2), "fd00::2/64");
    }

    #[test]
    fn test_free_subranges_empty_container() {
        let free = free_subranges(&cidr("10.0.0.0/24"), &[]);
        assert_eq!(free, vec![cidr("10.0.0.0/24")]);
    }

    #[test]
    fn test_free_subranges_with_hole() {
        let free = free_subranges(&cidr("10.0.0.0/24"), &[cidr("10.0.0.0/31")]);
        assert_eq!(free[0], cidr("10.0.0.2/31"));
        assert_eq!(free.last().unwrap(), &cidr("10.0.0.128/25"));
        // Free space must cover everything but the allocated /31
        let total: u128 = free.iter().map(|b| b.last() - b.network + 1).sum();
        assert_eq!(total, 256 - 2);
    }

    #[test]
    fn test_first_fit_ascending() {
        let container = cidr("10.0.0.0/24");
        assert_eq!(first_fit(&container, &[], 31), Some(cidr("10.0.0.0/31")));
        assert_eq!(
            first_fit(&container, &[cidr("10.0.0.0/31")], 31),
            Some(cidr("10.0.0.2/31"))
        );
    }

    #[test]
    fn test_first_fit_exhausted() {
        let container = cidr("10.0.0.0/31");
        assert_eq!(first_fit(&container, &[cidr("10.0.0.0/31")], 31), None);
    }

    #[test]
    fn test_first_fit_v6() {
        let container = cidr("2a03:2260:2342:f000::/56");
        assert_eq!(
            first_fit(&container, &[], 64),
            Some(cidr("2a03:2260:2342:f000::/64"))
        );
        assert_eq!(
            first_fit(&container, &[cidr("2a03:2260:2342:f000::/64")], 64),
            Some(cidr("2a03:2260:2342:f001::/64"))
        );
    }

    #[test]
    fn test_strip_domain() {
        assert_eq!(strip_domain("bbr-pbhsw.in.ffho.net", "in.ffho.net"), "bbr-pbhsw");
        assert_eq!(strip_domain("bbr-pbhsw", "in.ffho.net"), "bbr-pbhsw");
    }

    #[test]
    fn test_tunnel_interface_name() {
        assert_eq!(
            tunnel_interface_name("gw01.in.ffho.net", "in.ffho.net", false),
            "wg-gw01"
        );
        assert_eq!(
            tunnel_interface_name("gw01.in.ffho.net", "in.ffho.net", true),
            "oob-gw01"
        );
        // Dots become dashes, and the name is clamped to 15 chars
        let long = tunnel_interface_name("bbr-somewhere-long.in.ffho.net", "in.ffho.net", false);
        assert_eq!(long, "wg-bbr-somewher");
        assert_eq!(long.len(), 15);
    }

    #[test]
    fn test_transfer_prefix_description() {
        assert_eq!(
            transfer_prefix_description("gw01.in.ffho.net", "bbr-x.in.ffho.net", "in.ffho.net"),
            "gw01 <-> bbr-x"
        );
    }

    #[test]
    fn test_parse_pole_layout() {
        assert_eq!(
            parse_pole_layout("1:2 2:1").unwrap(),
            vec![("1".to_string(), 2), ("2".to_string(), 1)]
        );
        assert!(parse_pole_layout("").is_err());
        assert!(parse_pole_layout("1-2").is_err());
        assert!(parse_pole_layout("1:zero").is_err());
        assert!(parse_pole_layout("1:0").is_err());
    }
}
