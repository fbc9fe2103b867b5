//! DNS resolution probe.
//!
//! Forward lookups go through tokio (which defers to the system resolver).
//! Reverse lookups call `getnameinfo(3)` directly so they honour the same
//! `/etc/hosts` and NSS configuration as every other client on the box.

use std::{
    ffi::CStr,
    io, mem,
    net::IpAddr,
    ptr,
    time::Duration,
};

use log::info;
use pgdiag_common::Finding;
use super::resolve;
use crate::probes::{CommandRunner, Probe};

const HOST_BUF_LEN: usize = 1025;

pub struct DnsProbe {
    host: String,
    timeout: Duration,
}

impl DnsProbe {
    pub fn new(host: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            timeout,
        }
    }

    async fn forward(&self) -> io::Result<Vec<IpAddr>> {
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in resolve(&self.host, 0, self.timeout).await? {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        // IPv4 first, as gethostbyname would answer.
        ips.sort_by_key(|ip| !ip.is_ipv4());
        if ips.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no addresses returned",
            ));
        }
        Ok(ips)
    }
}

/// Resolve the PTR name of `ip`. Fails when the address has no name.
pub fn reverse_lookup(ip: IpAddr) -> io::Result<String> {
    let mut host = [0 as libc::c_char; HOST_BUF_LEN];

    let ret = match ip {
        IpAddr::V4(v4) => {
            let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
            sa.sin_family = libc::AF_INET as libc::sa_family_t;
            sa.sin_addr.s_addr = u32::from_ne_bytes(v4.octets());
            unsafe {
                libc::getnameinfo(
                    &sa as *const libc::sockaddr_in as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                    host.as_mut_ptr(),
                    HOST_BUF_LEN as libc::socklen_t,
                    ptr::null_mut(),
                    0,
                    libc::NI_NAMEREQD,
                )
            }
        }
        IpAddr::V6(v6) => {
            let mut sa: libc::sockaddr_in6 = unsafe { mem::zeroed() };
            sa.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sa.sin6_addr.s6_addr = v6.octets();
            unsafe {
                libc::getnameinfo(
                    &sa as *const libc::sockaddr_in6 as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                    host.as_mut_ptr(),
                    HOST_BUF_LEN as libc::socklen_t,
                    ptr::null_mut(),
                    0,
                    libc::NI_NAMEREQD,
                )
            }
        }
    };

    if ret != 0 {
        let reason = unsafe { CStr::from_ptr(libc::gai_strerror(ret)) };
        return Err(io::Error::other(reason.to_string_lossy().into_owned()));
    }

    let name = unsafe { CStr::from_ptr(host.as_ptr()) };
    Ok(name.to_string_lossy().into_owned())
}

impl Probe for DnsProbe {
    fn title(&self) -> String {
        "🌐 DNS resolution...".to_string()
    }

    async fn run<R: CommandRunner>(&self, _runner: &R) -> Vec<Finding> {
        let ips = match self.forward().await {
            Ok(ips) => ips,
            Err(e) => return vec![Finding::fail(format!("DNS error: {}", e))],
        };

        let ip = ips[0];
        info!("DNS_QUERY name={} answers={:?}", self.host, ips);
        let forward = Finding::pass(format!("DNS resolves {} → {}", self.host, ip)).with_details(
            ips.iter()
                .skip(1)
                .map(|other| format!("also resolves to {}", other)),
        );

        let reverse = match tokio::task::spawn_blocking(move || reverse_lookup(ip)).await {
            Ok(Ok(name)) => Finding::pass(format!("Reverse DNS {} → {}", ip, name)),
            Ok(Err(e)) => Finding::warn(format!("Reverse DNS not available for {}", ip))
                .with_detail(e.to_string()),
            Err(e) => Finding::warn(format!("Reverse DNS not available for {}", ip))
                .with_detail(e.to_string()),
        };

        vec![forward, reverse]
    }
}
