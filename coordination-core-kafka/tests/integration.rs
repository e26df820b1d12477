#![cfg(feature = "client")]
use coordination_core::event::ChannelBroker;
use coordination_core_kafka::KafkaBroker;
use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    message::{BorrowedMessage, Message},
    producer::FutureProducer,
    ClientConfig,
};
use testcontainers::{clients::Cli, core::WaitFor, images::generic::GenericImage, Container};

fn start_redpanda() -> (Cli, Container<GenericImage>, String) {
    let docker = Cli::default();
    let image = GenericImage::new("docker.redpanda.com/redpanda/redpanda", "v23.3.8")
        .with_wait_for(WaitFor::message("Started Kafka API"));
    let container = docker.run(image);
    let port = container.get_host_port_ipv4(9092);
    let brokers = format!("127.0.0.1:{}", port);
    (docker, container, brokers)
}

#[tokio::test]
#[ignore]
async fn publish_is_observed_by_a_raw_consumer() {
    let (_cli, _node, brokers) = start_redpanda();
    let topic = "orders.created";

    let producer: FutureProducer =
        ClientConfig::new().set("bootstrap.servers", &brokers).create().unwrap();
    let broker = KafkaBroker::new(producer, brokers.clone());

    let consumer: StreamConsumer = ClientConfig::new()
        .set("group.id", "test-group")
        .set("bootstrap.servers", &brokers)
        .set("auto.offset.reset", "earliest")
        .create()
        .unwrap();
    consumer.subscribe(&[topic]).unwrap();

    broker.publish("orders:created", b"{\"id\":1}").await.unwrap();

    let msg: BorrowedMessage = consumer.recv().await.unwrap();
    let payload = msg.payload().expect("payload");
    assert_eq!(payload, b"{\"id\":1}");
}
