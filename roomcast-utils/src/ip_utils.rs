use get_if_addrs::get_if_addrs;
use std::collections::HashMap;
use std::net::UdpSocket;

/// Guesses the local IP address that would be used for outbound traffic.
///
/// Opens a UDP socket and "connects" it to a public address (no packet is
/// actually sent for UDP); the OS picks the outbound interface for us and we
/// read it back. Falls back to `127.0.0.1` on any failure.
pub fn guess_local_ip() -> String {
    match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    return local_addr.ip().to_string();
                }
            }
            "127.0.0.1".to_string()
        }
        Err(_) => "127.0.0.1".to_string(),
    }
}

/// Lists every non-loopback IPv4 address per network interface.
pub fn list_all_ips() -> HashMap<String, Vec<String>> {
    let mut result = HashMap::new();

    if let Ok(interfaces) = get_if_addrs() {
        for iface in interfaces {
            let ip = iface.ip();
            if ip.is_loopback() || !ip.is_ipv4() {
                continue;
            }
            result.entry(iface.name).or_insert_with(Vec::new).push(ip.to_string());
        }
    } else {
        result.insert("error".to_string(), vec!["failed to list interfaces".to_string()]);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[test]
    fn guess_local_ip_returns_parsable_address() {
        let ip = guess_local_ip();
        assert!(ip.parse::<IpAddr>().is_ok());
    }

    #[test]
    fn list_all_ips_excludes_loopback() {
        let ips = list_all_ips();
        for (_, addrs) in ips.iter() {
            for addr in addrs {
                if let Ok(parsed) = addr.parse::<IpAddr>() {
                    assert!(!parsed.is_loopback());
                }
            }
        }
    }
}
