use port_prowler_rs::resolver::resolve_ipv4;
use std::net::Ipv4Addr;

#[tokio::test]
async fn literal_ipv4_is_returned_verbatim() {
    let ip = resolve_ipv4("1.2.3.4").await.expect("literal resolves");
    assert_eq!(ip, Ipv4Addr::new(1, 2, 3, 4));
}

#[tokio::test]
async fn ipv6_literal_is_rejected() {
    let err = resolve_ipv4("::1").await.unwrap_err();
    assert!(err.to_string().contains("IPv6"));
}

#[tokio::test]
async fn empty_target_is_rejected() {
    assert!(resolve_ipv4("   ").await.is_err());
}
