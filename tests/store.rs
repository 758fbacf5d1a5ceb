use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use inetnum::addr::Prefix;
use stride_store::RouteTable;

fn pfx(s: &str) -> Prefix {
    s.parse().unwrap()
}

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn test_insert_get_remove_roundtrip() -> Result<(), Box<dyn Error>> {
    let mut tbl = RouteTable::new();

    assert_eq!(tbl.insert(&pfx("10.0.0.0/8"), "a"), None);
    assert_eq!(tbl.get(&pfx("10.0.0.0/8")), Some(&"a"));
    assert_eq!(tbl.size(), 1);

    // re-insert of an equal prefix reports the old value and the new one
    // wins
    assert_eq!(tbl.insert(&pfx("10.0.0.0/8"), "a2"), Some("a"));
    assert_eq!(tbl.get(&pfx("10.0.0.0/8")), Some(&"a2"));
    assert_eq!(tbl.size(), 1);

    assert_eq!(tbl.remove(&pfx("10.0.0.0/8")), Some("a2"));
    assert_eq!(tbl.get(&pfx("10.0.0.0/8")), None);
    assert_eq!(tbl.remove(&pfx("10.0.0.0/8")), None);
    assert_eq!(tbl.size(), 0);
    Ok(())
}

#[test]
fn test_non_canonical_prefixes_are_masked() -> Result<(), Box<dyn Error>> {
    let mut tbl = RouteTable::new();

    let raw = Prefix::new_relaxed(Ipv4Addr::new(10, 1, 2, 3).into(), 8)?;
    tbl.insert(&raw, 1);

    assert_eq!(tbl.get(&pfx("10.0.0.0/8")), Some(&1));
    let other = Prefix::new_relaxed(Ipv4Addr::new(10, 200, 0, 7).into(), 8)?;
    assert_eq!(tbl.get(&other), Some(&1));
    assert_eq!(tbl.size(), 1);

    tbl.all(|p, _| {
        assert_eq!(p, pfx("10.0.0.0/8"));
        true
    });
    Ok(())
}

#[test]
fn test_lookup_scenario_v4() -> Result<(), Box<dyn Error>> {
    let mut tbl = RouteTable::new();
    tbl.insert(&pfx("10.0.0.0/8"), "A");
    tbl.insert(&pfx("10.0.0.0/24"), "B");
    tbl.insert(&pfx("10.0.1.0/24"), "C");
    tbl.insert(&pfx("192.168.0.0/16"), "D");

    assert_eq!(tbl.lookup(&addr("10.0.1.17")), Some(&"C"));
    assert_eq!(tbl.lookup(&addr("10.0.5.5")), Some(&"A"));
    assert_eq!(tbl.lookup(&addr("10.0.0.255")), Some(&"B"));
    assert_eq!(tbl.lookup(&addr("192.168.255.255")), Some(&"D"));
    assert_eq!(tbl.lookup(&addr("42.0.0.0")), None);
    assert_eq!(tbl.lookup(&addr("192.169.0.0")), None);

    assert!(tbl.contains(&addr("10.200.0.1")));
    assert!(!tbl.contains(&addr("11.0.0.1")));

    // families never mix
    assert_eq!(tbl.lookup(&addr("::ffff:10.0.1.17")), None);
    Ok(())
}

#[test]
fn test_lookup_scenario_v6() -> Result<(), Box<dyn Error>> {
    let mut tbl = RouteTable::new();
    tbl.insert(&pfx("::/0"), "X");
    tbl.insert(&pfx("2000::/3"), "Y");
    tbl.insert(&pfx("2001:db8::/32"), "Z");

    assert_eq!(tbl.lookup(&addr("2001:7c0::")), Some(&"Y"));
    assert_eq!(tbl.lookup(&addr("2001:db8::1")), Some(&"Z"));
    assert_eq!(tbl.lookup(&addr("fe80::1")), Some(&"X"));

    assert_eq!(
        tbl.lookup_prefix_lpm(&pfx("2001:db8::/48")),
        Some((pfx("2001:db8::/32"), &"Z"))
    );
    assert_eq!(tbl.lookup_prefix(&pfx("2001:db8::/32")), Some(&"Z"));
    assert_eq!(tbl.lookup_prefix(&pfx("3000::/4")), Some(&"Y"));
    assert_eq!(tbl.lookup_prefix(&pfx("8000::/1")), Some(&"X"));
    Ok(())
}

#[test]
fn test_lookup_prefix_lpm_v4() -> Result<(), Box<dyn Error>> {
    let mut tbl = RouteTable::new();
    tbl.insert(&pfx("10.0.0.0/8"), 8);
    tbl.insert(&pfx("10.0.0.0/16"), 16);
    tbl.insert(&pfx("10.0.0.0/26"), 26);

    assert_eq!(
        tbl.lookup_prefix_lpm(&pfx("10.0.0.0/32")),
        Some((pfx("10.0.0.0/26"), &26))
    );
    assert_eq!(
        tbl.lookup_prefix_lpm(&pfx("10.0.0.128/25")),
        Some((pfx("10.0.0.0/16"), &16))
    );
    assert_eq!(
        tbl.lookup_prefix_lpm(&pfx("10.0.0.0/16")),
        Some((pfx("10.0.0.0/16"), &16))
    );
    assert_eq!(
        tbl.lookup_prefix_lpm(&pfx("10.7.0.0/16")),
        Some((pfx("10.0.0.0/8"), &8))
    );
    assert_eq!(tbl.lookup_prefix_lpm(&pfx("11.0.0.0/8")), None);
    Ok(())
}

#[test]
fn test_remove_collapses_subtree() -> Result<(), Box<dyn Error>> {
    let mut tbl = RouteTable::new();
    tbl.insert(&pfx("10.0.0.0/8"), "eight");
    tbl.insert(&pfx("10.0.0.0/24"), "twentyfour");

    assert_eq!(tbl.remove(&pfx("10.0.0.0/8")), Some("eight"));

    // the /8 coverage is gone, the /24 still answers
    assert_eq!(tbl.lookup(&addr("10.0.5.5")), None);
    assert_eq!(tbl.lookup(&addr("10.0.0.1")), Some(&"twentyfour"));
    assert_eq!(tbl.size(), 1);
    Ok(())
}

#[test]
fn test_host_routes() -> Result<(), Box<dyn Error>> {
    let mut tbl = RouteTable::new();
    tbl.insert(&pfx("127.0.0.0/8"), "loop");
    tbl.insert(&pfx("127.0.0.1/32"), "localhost");
    tbl.insert(&pfx("255.255.255.255/32"), "bcast");
    tbl.insert(&pfx("0.0.0.0/0"), "default");

    assert_eq!(tbl.lookup(&addr("127.0.0.1")), Some(&"localhost"));
    assert_eq!(tbl.lookup(&addr("127.0.0.2")), Some(&"loop"));
    assert_eq!(tbl.lookup(&addr("255.255.255.255")), Some(&"bcast"));
    assert_eq!(tbl.lookup(&addr("8.8.8.8")), Some(&"default"));

    let mut tbl6 = RouteTable::new();
    tbl6.insert(&pfx("::1/128"), "lo6");
    tbl6.insert(
        &Prefix::new(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1).into(), 128)?,
        "lo6-again",
    );
    assert_eq!(tbl6.size(), 1);
    assert_eq!(tbl6.lookup(&addr("::1")), Some(&"lo6-again"));
    assert_eq!(tbl6.lookup(&addr("::2")), None);
    Ok(())
}

#[test]
fn test_size_counters_per_family() -> Result<(), Box<dyn Error>> {
    let mut tbl = RouteTable::new();
    tbl.insert(&pfx("10.0.0.0/8"), 0);
    tbl.insert(&pfx("10.0.0.0/16"), 0);
    tbl.insert(&pfx("2001:db8::/32"), 0);

    assert_eq!(tbl.size4(), 2);
    assert_eq!(tbl.size6(), 1);
    assert_eq!(tbl.size(), 3);

    tbl.remove(&pfx("10.0.0.0/16"));
    assert_eq!(tbl.size4(), 1);
    assert_eq!(tbl.size(), 2);
    Ok(())
}

#[test]
fn test_update_counts_only_new_prefixes() -> Result<(), Box<dyn Error>> {
    let mut tbl = RouteTable::new();

    for _ in 0..3 {
        tbl.update(&pfx("10.0.0.0/8"), |old| old.copied().unwrap_or(0) + 1);
    }
    assert_eq!(tbl.size(), 1);
    assert_eq!(tbl.get(&pfx("10.0.0.0/8")), Some(&3));
    Ok(())
}
