//! 列出串口

use anyhow::Result;

pub fn execute() -> Result<()> {
    let ports = scanhead_serial::list_ports()?;
    if ports.is_empty() {
        println!("(未发现串口)");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}
