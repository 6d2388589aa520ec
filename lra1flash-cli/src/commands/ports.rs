//! Serial port listing.

use anyhow::Result;
use lra1flash::{NativePortEnumerator, PortEnumerator};

pub fn run(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports()?;

    if json {
        let entries: Vec<serde_json::Value> = ports
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial_number": p.serial_number,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    for p in &ports {
        let mut line = p.name.clone();
        if let (Some(vid), Some(pid)) = (p.vid, p.pid) {
            line.push_str(&format!(" [{vid:04x}:{pid:04x}]"));
        }
        if let Some(product) = &p.product {
            line.push_str(&format!(" {product}"));
        }
        println!("{line}");
    }

    Ok(())
}
