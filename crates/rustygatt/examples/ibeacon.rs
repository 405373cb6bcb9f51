//! Example broadcasting an iBeacon.

use rustygatt::{Device, DeviceConfig, Uuid};
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let device = Device::new(DeviceConfig {
        name: "beacon".into(),
        ..DeviceConfig::default()
    });
    device.init(0)?;

    // A fresh proximity UUID per run; pin one down for production use.
    let proximity = Uuid::new_random();
    device.advertise_ibeacon(proximity, 1, 2, -59)?;
    println!("broadcasting iBeacon {}", proximity);

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
