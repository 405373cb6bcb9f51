//! Example demonstrating the central role: scan, connect to the first
//! connectable peripheral, and dump its attribute hierarchy.

use rustygatt::{Device, DeviceConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let device = Device::new(DeviceConfig::default());
    let connecting = Arc::new(AtomicBool::new(false));

    {
        let device_ref = Arc::downgrade(&device);
        let connecting = connecting.clone();
        device.on_peripheral_discovered(move |pd, adv, rssi| {
            println!(
                "saw {:02x?} rssi {} name {:?} services {:?}",
                pd.addr, rssi, adv.local_name, adv.service_uuids
            );
            if pd.connectable && !connecting.swap(true, Ordering::AcqRel) {
                if let Some(device) = device_ref.upgrade() {
                    let _ = device.stop_scanning();
                    let _ = device.connect(pd);
                }
            }
        });
    }

    device.on_peripheral_connected(|p| {
        println!("connected to {}", p.id());
        let _ = p.exchange_mtu(185);
        let services = match p.discover_services(None) {
            Ok(s) => s,
            Err(e) => {
                println!("service discovery failed: {}", e);
                return;
            }
        };
        for svc in services {
            println!("service {} [{:#06x}..{:#06x}]", svc.uuid, svc.start_handle, svc.end_handle);
            let chars = match p.discover_characteristics(None, &svc) {
                Ok(c) => c,
                Err(e) => {
                    println!("  characteristic discovery failed: {}", e);
                    continue;
                }
            };
            for mut c in chars {
                println!("  characteristic {} ({})", c.uuid, c.properties);
                if c.properties.can_read() {
                    match p.read_characteristic(&c) {
                        Ok(v) => println!("    value: {:?}", v),
                        Err(e) => println!("    read failed: {}", e),
                    }
                }
                if let Ok(descs) = p.discover_descriptors(&mut c) {
                    for d in descs {
                        println!("    descriptor {} @ {:#06x}", d.uuid, d.handle);
                    }
                }
            }
        }
    });

    device.on_peripheral_disconnected(|p| println!("{} disconnected", p.id()));

    device.init(0)?;
    device.scan(true)?;
    println!("scanning, ctrl-c to quit");

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
