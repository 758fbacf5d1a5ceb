//! Subnet enumeration: all stored routes covered by a query prefix, in
//! CIDR sort order.

use std::error::Error;

use inetnum::addr::Prefix;
use stride_store::RouteTable;

fn pfx(s: &str) -> Prefix {
    s.parse().unwrap()
}

fn table(pfxs: &[&str]) -> RouteTable<usize> {
    let mut tbl = RouteTable::new();
    for (i, p) in pfxs.iter().enumerate() {
        tbl.insert(&pfx(p), i);
    }
    tbl
}

fn subnets_of(tbl: &RouteTable<usize>, q: &str) -> Vec<Prefix> {
    let mut out = vec![];
    tbl.subnets(&pfx(q), |p, _| {
        out.push(p);
        true
    });
    out
}

#[test]
fn test_subnets_basic() -> Result<(), Box<dyn Error>> {
    let tbl = table(&[
        "10.0.0.0/8",
        "10.0.0.0/24",
        "10.0.1.0/24",
        "192.168.0.0/16",
    ]);

    assert_eq!(
        subnets_of(&tbl, "10.0.0.0/8"),
        vec![pfx("10.0.0.0/8"), pfx("10.0.0.0/24"), pfx("10.0.1.0/24")]
    );
    assert_eq!(
        subnets_of(&tbl, "10.0.0.0/16"),
        vec![pfx("10.0.0.0/24"), pfx("10.0.1.0/24")]
    );
    assert_eq!(
        subnets_of(&tbl, "0.0.0.0/0"),
        vec![
            pfx("10.0.0.0/8"),
            pfx("10.0.0.0/24"),
            pfx("10.0.1.0/24"),
            pfx("192.168.0.0/16")
        ]
    );
    assert_eq!(subnets_of(&tbl, "11.0.0.0/8"), vec![]);
    Ok(())
}

#[test]
fn test_subnets_intra_stride_order() -> Result<(), Box<dyn Error>> {
    // all inside one stride: order is by address, then by mask length
    let tbl = table(&[
        "10.128.0.0/9",
        "10.0.0.0/9",
        "10.64.0.0/10",
        "10.0.0.0/10",
        "10.192.0.0/10",
        "10.0.0.0/8",
    ]);

    assert_eq!(
        subnets_of(&tbl, "10.0.0.0/8"),
        vec![
            pfx("10.0.0.0/8"),
            pfx("10.0.0.0/9"),
            pfx("10.0.0.0/10"),
            pfx("10.64.0.0/10"),
            pfx("10.128.0.0/9"),
            pfx("10.192.0.0/10"),
        ]
    );
    assert_eq!(
        subnets_of(&tbl, "10.128.0.0/9"),
        vec![pfx("10.128.0.0/9"), pfx("10.192.0.0/10")]
    );
    Ok(())
}

#[test]
fn test_subnets_exact_only_match() -> Result<(), Box<dyn Error>> {
    let tbl = table(&["10.1.2.0/24", "10.1.3.0/24"]);

    // query equals a stored leaf
    assert_eq!(subnets_of(&tbl, "10.1.2.0/24"), vec![pfx("10.1.2.0/24")]);
    // query below the leaf
    assert_eq!(subnets_of(&tbl, "10.1.2.0/25"), vec![]);
    // query covering both
    assert_eq!(
        subnets_of(&tbl, "10.1.2.0/23"),
        vec![pfx("10.1.2.0/24"), pfx("10.1.3.0/24")]
    );
    Ok(())
}

#[test]
fn test_subnets_v6() -> Result<(), Box<dyn Error>> {
    let tbl =
        table(&["::/0", "2000::/3", "2001:db8::/32", "2001:db8::1/128"]);

    assert_eq!(
        subnets_of(&tbl, "2000::/3"),
        vec![
            pfx("2000::/3"),
            pfx("2001:db8::/32"),
            pfx("2001:db8::1/128")
        ]
    );
    assert_eq!(
        subnets_of(&tbl, "::/0"),
        vec![
            pfx("::/0"),
            pfx("2000::/3"),
            pfx("2001:db8::/32"),
            pfx("2001:db8::1/128")
        ]
    );
    assert_eq!(
        subnets_of(&tbl, "2001:db8::/127"),
        vec![pfx("2001:db8::1/128")]
    );
    Ok(())
}

#[test]
fn test_subnets_early_stop() -> Result<(), Box<dyn Error>> {
    let tbl = table(&["10.0.0.0/8", "10.0.0.0/24", "10.0.1.0/24"]);

    let mut seen = vec![];
    let completed = tbl.subnets(&pfx("10.0.0.0/8"), |p, _| {
        seen.push(p);
        seen.len() < 2
    });
    assert!(!completed);
    assert_eq!(seen, vec![pfx("10.0.0.0/8"), pfx("10.0.0.0/24")]);
    Ok(())
}

#[test]
fn test_each_subnet_is_subnets() -> Result<(), Box<dyn Error>> {
    let tbl = table(&["10.0.0.0/8", "10.0.0.0/24", "10.0.1.0/24"]);

    let mut via_each = vec![];
    tbl.each_subnet(&pfx("10.0.0.0/8"), |p, _| {
        via_each.push(p);
        true
    });
    assert_eq!(via_each, subnets_of(&tbl, "10.0.0.0/8"));
    Ok(())
}
