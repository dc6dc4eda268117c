use std::ops::Range;

use crate::key_encoder::reverse_host;

/// Smallest byte string that sorts after every string starting with
/// `prefix`. Empty when no such bound exists, which backends read as
/// "unbounded".
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();

    while let Some(last_byte) = end.last_mut() {
        if *last_byte < 0xFF {
            *last_byte += 1;
            return end;
        }
        end.pop();
    }

    end
}

/// Smallest byte string that sorts strictly after `key`.
pub fn next_key(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0x00);
    next
}

/// Key range holding every key of exactly this host, e.g. `com.example:` up
/// to `com.example;`. Subdomains are not included.
pub fn host_scan_range(host: &str) -> Range<Vec<u8>> {
    let start = format!("{}:", reverse_host(host)).into_bytes();
    let end = prefix_end(&start);
    start..end
}

/// Key ranges holding every key of `domain` and of all its subdomains, in key
/// order. Hosts that merely share a textual prefix (`examples.com` for
/// `example.com`) fall outside both.
pub fn domain_scan_ranges(domain: &str) -> [Range<Vec<u8>>; 2] {
    let reversed = reverse_host(domain);

    let subdomains = format!("{}.", reversed).into_bytes();
    let subdomains_end = prefix_end(&subdomains);

    let exact = format!("{}:", reversed).into_bytes();
    let exact_end = prefix_end(&exact);

    [subdomains..subdomains_end, exact..exact_end]
}
