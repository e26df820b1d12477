#![cfg(feature = "client")]
use coordination_core::event::ChannelBroker;
use coordination_core_nats::NatsBroker;
use testcontainers::{clients::Cli, core::WaitFor, images::generic::GenericImage, Container};

fn start_nats() -> (Cli, Container<GenericImage>, String) {
    let docker = Cli::default();
    let image = GenericImage::new("nats", "2.10.8-alpine")
        .with_wait_for(WaitFor::message("Server is ready"));
    let container = docker.run(image);
    let host_port = container.get_host_port_ipv4(4222);
    let addr = format!("nats://127.0.0.1:{}", host_port);
    (docker, container, addr)
}

#[tokio::test]
#[ignore]
async fn publish_is_observed_by_a_raw_subscriber() {
    let (_cli, _node, addr) = start_nats();

    let conn = nats::connect(&addr).unwrap();
    let broker = NatsBroker::new(conn.clone());

    let sub = conn.subscribe("orders.created").unwrap();
    broker.publish("orders:created", b"{\"id\":1}").await.unwrap();

    let msg = sub.next_timeout(std::time::Duration::from_secs(2)).expect("message");
    assert_eq!(msg.data, b"{\"id\":1}");
}
