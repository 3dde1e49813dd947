use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use memngt_rpc::{return_value, ArgumentReader, Arguments, ContractHandler, HandlerError, RpcConfig, RpcService};

struct Counter {
    value: AtomicU32,
}

impl ContractHandler for Counter {
    fn handle(&self, operation: &str, args: &mut ArgumentReader<'_>) -> Result<Vec<u8>, HandlerError> {
        match operation {
            "add" => {
                let delta: u32 = args.next()?;
                args.finish()?;
                return_value(&(self.value.fetch_add(delta, Ordering::SeqCst) + delta))
            }
            "blob" => {
                let len: u32 = args.next()?;
                args.finish()?;
                return_value(&vec![0xabu8; len as usize])
            }
            _ => Err(HandlerError::UnknownOperation(operation.to_string())),
        }
    }
}

fn start() -> RpcService {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = RpcConfig::default().with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)));
    let service = RpcService::new(config).expect("Should bind udp");
    service.register_handler("counter", Arc::new(Counter { value: AtomicU32::new(0) })).expect("Should register");
    service
}

#[test]
fn udp_round_trip_both_directions() {
    let node1 = start();
    let node2 = start();
    assert_ne!(node1.local_addr().port(), 0);

    let to_node2 = node1.create_proxy(node2.local_addr(), "counter");
    let to_node1 = node2.create_proxy(node1.local_addr(), "counter");
    assert_eq!(to_node2.call::<u32>("add", Arguments::new().with(&5u32).unwrap()).unwrap(), 5);
    assert_eq!(to_node2.call::<u32>("add", Arguments::new().with(&5u32).unwrap()).unwrap(), 10);
    assert_eq!(to_node1.call::<u32>("add", Arguments::new().with(&1u32).unwrap()).unwrap(), 1);

    assert_eq!(node2.stats().requests_executed, 2);
    assert_eq!(node1.stats().requests_executed, 1);
}

#[test]
fn udp_large_response() {
    let server = start();
    let client = start();
    let blob: Vec<u8> = client
        .create_proxy(server.local_addr(), "counter")
        .call("blob", Arguments::new().with(&50_000u32).unwrap())
        .expect("Should call");
    assert_eq!(blob.len(), 50_000);
    assert!(blob.iter().all(|b| *b == 0xab));
}

#[test]
fn drop_stops_service() {
    let addr = {
        let service = start();
        service.local_addr()
    };
    // the port is free again once the service is dropped
    let rebound = RpcService::new(RpcConfig::default().with_bind_addr(addr)).expect("Should bind same port");
    assert_eq!(rebound.local_addr(), addr);
}
