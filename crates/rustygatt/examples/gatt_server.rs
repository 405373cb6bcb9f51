//! Example demonstrating a GATT peripheral.
//!
//! Serves one custom service with a readable, writable, and notifying
//! characteristic, and advertises it until interrupted.

use rustygatt::gatt::{Notifier, Request, Service, STATUS_SUCCESS};
use rustygatt::{Device, DeviceConfig, Uuid};
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let device = Device::new(DeviceConfig {
        name: "rustygatt".into(),
        ..DeviceConfig::default()
    });

    device.on_central_connected(|c| println!("central {} connected", c.id()));
    device.on_central_disconnected(|c| println!("central {} disconnected", c.id()));

    let mut svc = Service::new("09fc95c0-c111-11e3-9904-0002a5d5c51b".parse::<Uuid>()?);
    {
        let counter = svc.add_characteristic("11fac9e0-c111-11e3-9246-0002a5d5c51b".parse()?);
        counter.handle_read_fn(|resp, _req| {
            resp.write(b"count has reached maximum").unwrap();
        });
        counter.handle_notify_fn(|_req: &Request, n: Notifier| {
            let mut count = 0u32;
            while !n.done() {
                let msg = format!("count: {}", count);
                if n.write(msg.as_bytes()).is_err() {
                    break;
                }
                count += 1;
                thread::sleep(Duration::from_secs(1));
            }
        });
    }
    {
        let echo = svc.add_characteristic("16fe0d80-c111-11e3-b8c8-0002a5d5c51b".parse()?);
        echo.handle_write_fn(|_req, data| {
            println!("wrote: {:?}", data);
            STATUS_SUCCESS
        });
    }
    let svc_uuid = svc.uuid();
    device.add_service(svc)?;

    device.init(0)?;
    device.set_advertising_services(&[svc_uuid]);
    device.advertise()?;
    println!("advertising as \"rustygatt\", ctrl-c to quit");

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
