use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// Hostnames that always mean "this machine" and are rejected without a lookup.
const LOCALHOST_ALIASES: [&str; 2] = ["localhost", "localhost.localdomain"];

/// Network category of a resolved address.
///
/// Every address lands in exactly one category. Only [`HostCategory::Public`]
/// is considered reachable for feed fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCategory {
    Private,
    Loopback,
    LinkLocal,
    Multicast,
    Reserved,
    Unspecified,
    Public,
}

impl HostCategory {
    pub fn is_public(self) -> bool {
        self == HostCategory::Public
    }
}

impl fmt::Display for HostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostCategory::Private => "private",
            HostCategory::Loopback => "loopback",
            HostCategory::LinkLocal => "link-local",
            HostCategory::Multicast => "multicast",
            HostCategory::Reserved => "reserved",
            HostCategory::Unspecified => "unspecified",
            HostCategory::Public => "public",
        };
        f.write_str(name)
    }
}

/// A resolved address together with its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedAddr {
    pub ip: IpAddr,
    pub category: HostCategory,
}

/// DNS lookup failed, or returned no addresses at all.
#[derive(Debug, Error)]
#[error("Unable to resolve host: {host}")]
pub struct ResolutionError {
    pub host: String,
    #[source]
    pub source: io::Error,
}

/// Reasons a host is refused as a fetch target.
#[derive(Debug, Error)]
pub enum HostError {
    /// Well-known loopback alias, rejected before any lookup.
    #[error("uses localhost, which is not allowed")]
    Localhost,
    /// At least one resolved address is not public.
    #[error("resolves to a non-public IP address ({ip} is {category})")]
    NonPublic { ip: IpAddr, category: HostCategory },
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Name resolution seam for the classifier.
///
/// The production implementation is [`SystemResolver`]; tests substitute a
/// fixed table so classification can be exercised without real DNS.
pub trait Resolve {
    fn resolve(&self, host: &str) -> impl Future<Output = io::Result<Vec<IpAddr>>>;
}

/// Resolves through the operating system's resolver via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Resolves hostnames and sorts each answer into a [`HostCategory`].
#[derive(Debug, Clone, Default)]
pub struct HostClassifier<R> {
    resolver: R,
}

impl<R: Resolve> HostClassifier<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Resolves `host` and categorizes every address it maps to.
    ///
    /// IP literals are classified as-is without consulting the resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] if the lookup fails or yields no addresses.
    pub async fn classify(&self, host: &str) -> Result<Vec<ClassifiedAddr>, ResolutionError> {
        let ips = match host.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => self
                .resolver
                .resolve(host)
                .await
                .map_err(|source| ResolutionError {
                    host: host.to_owned(),
                    source,
                })?,
        };

        // An empty answer would make "every address is public" vacuously true
        if ips.is_empty() {
            return Err(ResolutionError {
                host: host.to_owned(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            });
        }

        tracing::debug!(host = %host, addresses = ips.len(), "Resolved host");

        Ok(ips
            .into_iter()
            .map(|ip| ClassifiedAddr {
                ip,
                category: categorize(ip),
            })
            .collect())
    }

    /// Accepts `host` only if every address it resolves to is public.
    ///
    /// `host` is expected to be lower-cased and trimmed already.
    pub async fn ensure_public(&self, host: &str) -> Result<(), HostError> {
        if LOCALHOST_ALIASES.contains(&host) {
            return Err(HostError::Localhost);
        }

        let classified = self.classify(host).await?;
        match classified.iter().find(|addr| !addr.category.is_public()) {
            Some(addr) => {
                tracing::warn!(host = %host, ip = %addr.ip, category = %addr.category, "Rejecting non-public host");
                Err(HostError::NonPublic {
                    ip: addr.ip,
                    category: addr.category,
                })
            }
            None => Ok(()),
        }
    }
}

/// Assigns a single category to an address.
pub fn categorize(ip: IpAddr) -> HostCategory {
    match ip {
        IpAddr::V4(v4) => categorize_v4(v4),
        IpAddr::V6(v6) => categorize_v6(v6),
    }
}

fn categorize_v4(ip: Ipv4Addr) -> HostCategory {
    let [a, b, c, _] = ip.octets();

    if ip.is_unspecified() {
        return HostCategory::Unspecified;
    }
    if ip.is_loopback() {
        return HostCategory::Loopback;
    }
    if ip.is_link_local() {
        return HostCategory::LinkLocal;
    }
    if ip.is_multicast() {
        return HostCategory::Multicast;
    }

    let is_private = a == 0
        || ip.is_private()
        // Shared address space (100.64.0.0/10)
        || (a == 100 && (b & 0xc0) == 64)
        // IETF protocol assignments (192.0.0.0/24)
        || (a == 192 && b == 0 && c == 0)
        || ip.is_documentation()
        // Benchmarking (198.18.0.0/15)
        || (a == 198 && (b & 0xfe) == 18);
    if is_private {
        return HostCategory::Private;
    }

    if a >= 240 {
        return HostCategory::Reserved;
    }

    HostCategory::Public
}

fn categorize_v6(ip: Ipv6Addr) -> HostCategory {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return categorize_v4(v4);
    }
    if ip.is_unspecified() {
        return HostCategory::Unspecified;
    }
    if ip.is_loopback() {
        return HostCategory::Loopback;
    }

    let segments = ip.segments();
    // fe80::/10
    if (segments[0] & 0xffc0) == 0xfe80 {
        return HostCategory::LinkLocal;
    }
    if ip.is_multicast() {
        return HostCategory::Multicast;
    }

    // Unique local (fc00::/7)
    let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
    // Documentation (2001:db8::/32)
    let is_documentation = segments[0] == 0x2001 && segments[1] == 0x0db8;
    // IETF protocol assignments (2001::/23)
    let is_protocol_assignment = segments[0] == 0x2001 && segments[1] < 0x0200;
    // Local-use NAT64 (64:ff9b:1::/48)
    let is_local_nat64 = segments[0] == 0x0064 && segments[1] == 0xff9b && segments[2] == 0x0001;
    if is_unique_local || is_documentation || is_protocol_assignment || is_local_nat64 {
        return HostCategory::Private;
    }

    // Everything outside global unicast (2000::/3)
    if (segments[0] & 0xe000) != 0x2000 {
        return HostCategory::Reserved;
    }

    HostCategory::Public
}
