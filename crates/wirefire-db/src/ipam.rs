//! ipv4 address selection inside the cgnat pool.
//!
//! the pool is the carrier-grade nat /10 block reserved by the protocol.
//! selection starts at a uniformly random offset and walks forward modulo
//! the pool size until the caller's predicate accepts a candidate; the
//! random start distributes contention without any persistent cursor.

use std::net::{Ipv4Addr, Ipv6Addr};

use rand::Rng;

use crate::Error;

/// first address of the cgnat /10 block.
const CGNAT_BASE: Ipv4Addr = Ipv4Addr::new(100, 64, 0, 0);

/// number of addresses in a /10.
const CGNAT_COUNT: u32 = 1 << 22;

/// the ipv6 /96 prefix the protocol pairs with cgnat ipv4 addresses; the
/// ipv4 bits become the low 32 bits.
const MAPPED_V6_PREFIX: [u16; 6] = [0xfd7a, 0x115c, 0xa1e0, 0xab12, 0x4843, 0xcd96];

/// select a free ipv4 from the cgnat pool.
///
/// `predicate` decides whether a candidate is usable (the caller consults
/// the store to reject addresses already assigned in the target tailnet).
/// with a predicate that never accepts, the walk never returns; every
/// predicate call is an await point, so cancelling the surrounding task
/// interrupts the loop.
pub async fn select_ip<F, Fut>(predicate: F) -> Result<(Ipv4Addr, Ipv6Addr), Error>
where
    F: Fn(Ipv4Addr) -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let mut offset = rand::thread_rng().gen_range(0..CGNAT_COUNT);

    loop {
        let candidate = host_at(offset);
        if in_host_range(candidate) && predicate(candidate).await? {
            return Ok((candidate, to_ipv6(candidate)));
        }
        offset = (offset + 1) % CGNAT_COUNT;
    }
}

/// derive the paired ipv6 for a cgnat ipv4.
pub fn to_ipv6(ip: Ipv4Addr) -> Ipv6Addr {
    let v4 = u32::from(ip);
    let p = MAPPED_V6_PREFIX;
    Ipv6Addr::new(
        p[0],
        p[1],
        p[2],
        p[3],
        p[4],
        p[5],
        (v4 >> 16) as u16,
        v4 as u16,
    )
}

/// the address at `offset` within the pool.
fn host_at(offset: u32) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(CGNAT_BASE) + (offset % CGNAT_COUNT))
}

/// skip the block's network and broadcast addresses.
fn in_host_range(ip: Ipv4Addr) -> bool {
    let v = u32::from(ip);
    v != u32::from(CGNAT_BASE) && v != u32::from(CGNAT_BASE) + CGNAT_COUNT - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn selects_inside_cgnat_range() {
        let (v4, _) = select_ip(|_| async { Ok(true) }).await.unwrap();
        let octets = v4.octets();
        assert_eq!(octets[0], 100);
        assert!((64..128).contains(&octets[1]), "{v4} outside 100.64.0.0/10");
    }

    #[tokio::test]
    async fn walks_past_rejected_addresses() {
        use std::sync::Mutex;

        // reject the first two candidates; the third must be accepted and
        // distinct from the rejected ones
        let seen = Mutex::new(Vec::<Ipv4Addr>::new());
        let (v4, _) = select_ip(|candidate| {
            let rejected = {
                let mut seen = seen.lock().unwrap();
                seen.push(candidate);
                seen.len() <= 2
            };
            async move { Ok(!rejected) }
        })
        .await
        .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(v4, seen[2]);
        assert!(!seen[..2].contains(&v4));
    }

    #[tokio::test]
    async fn saturated_pool_is_interruptible() {
        // a predicate that never accepts must not return; cancellation via
        // timeout interrupts the walk at the predicate await point
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            select_ip(|_| async {
                tokio::task::yield_now().await;
                Ok(false)
            }),
        )
        .await;
        assert!(result.is_err(), "saturated select_ip should not complete");
    }

    #[test]
    fn ipv6_derivation() {
        let v6 = to_ipv6("100.64.0.1".parse().unwrap());
        assert_eq!(v6.to_string(), "fd7a:115c:a1e0:ab12:4843:cd96:6440:1");

        let v6 = to_ipv6("100.127.255.254".parse().unwrap());
        assert_eq!(v6.segments()[6], 0x647f);
        assert_eq!(v6.segments()[7], 0xfffe);
    }

    #[test]
    fn pool_edges_excluded() {
        assert!(!in_host_range("100.64.0.0".parse().unwrap()));
        assert!(!in_host_range("100.127.255.255".parse().unwrap()));
        assert!(in_host_range("100.64.0.1".parse().unwrap()));
        assert!(in_host_range("100.100.100.100".parse().unwrap()));
    }
}
