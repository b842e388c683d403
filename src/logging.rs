// CSV sinks on top of the event bus.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::events::{EventListener, SimEvent};

fn open_csv_with_header(dir: &Path, filename: &str, header: &str) -> std::io::Result<File> {
    create_dir_all(dir)?;
    let path: PathBuf = dir.join(filename);

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    file.write_all(header.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(file)
}

fn write_row(file: &mut File, logger: &str, line: &str) {
    if let Err(e) = file.write_all(line.as_bytes()) {
        warn!("[{logger}] write error: {e}");
    }
}

/// Trade logger: logs/trades.csv
pub struct CsvTradeLogger {
    file: File,
}

impl CsvTradeLogger {
    pub fn new<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let header = "ts,symbol,price,qty,maker,taker,maker_side";
        let file = open_csv_with_header(dir.as_ref(), "trades.csv", header)?;
        Ok(Self { file })
    }
}

impl EventListener for CsvTradeLogger {
    fn on_event(&mut self, event: &SimEvent) {
        if let SimEvent::Trade {
            ts,
            symbol,
            price,
            qty,
            maker_agent,
            taker_agent,
            maker_side,
        } = event
        {
            let line = format!(
                "{ts},{symbol},{price},{qty},{maker_agent},{taker_agent},{maker_side:?}\n"
            );
            write_row(&mut self.file, "CsvTradeLogger", &line);
        }
    }
}

/// Order logger: logs/orders.csv
pub struct CsvOrderLogger {
    file: File,
}

impl CsvOrderLogger {
    pub fn new<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let header = "ts,from,to,msg_type,symbol,side,price,qty,order_id";
        let file = open_csv_with_header(dir.as_ref(), "orders.csv", header)?;
        Ok(Self { file })
    }
}

impl EventListener for CsvOrderLogger {
    fn on_event(&mut self, event: &SimEvent) {
        if let SimEvent::OrderLog {
            ts,
            from,
            to,
            msg_type,
            symbol,
            side,
            price,
            qty,
            order_id,
        } = event
        {
            let symbol_str = symbol.as_deref().unwrap_or("");
            let side_str = side.map(|s| format!("{s:?}")).unwrap_or_default();
            let price_str = price.map(|p| p.to_string()).unwrap_or_default();
            let qty_str = qty.map(|q| q.to_string()).unwrap_or_default();
            let id_str = order_id.as_deref().unwrap_or("");

            let line = format!(
                "{ts},{from},{to},{msg_type:?},{symbol_str},{side_str},{price_str},{qty_str},{id_str}\n"
            );
            write_row(&mut self.file, "CsvOrderLogger", &line);
        }
    }
}

/// Rejection logger: logs/rejections.csv
pub struct CsvRejectionLogger {
    file: File,
}

impl CsvRejectionLogger {
    pub fn new<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let header = "ts,agent,reason,ref_type";
        let file = open_csv_with_header(dir.as_ref(), "rejections.csv", header)?;
        Ok(Self { file })
    }
}

impl EventListener for CsvRejectionLogger {
    fn on_event(&mut self, event: &SimEvent) {
        if let SimEvent::OrderRejected {
            ts,
            agent,
            reason,
            ref_type,
        } = event
        {
            let line = format!("{ts},{agent},{reason},{ref_type:?}\n");
            write_row(&mut self.file, "CsvRejectionLogger", &line);
        }
    }
}

/// Oracle logger: logs/oracle.csv
pub struct CsvOracleLogger {
    file: File,
}

impl CsvOracleLogger {
    pub fn new<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let header = "ts,symbol,fundamental";
        let file = open_csv_with_header(dir.as_ref(), "oracle.csv", header)?;
        Ok(Self { file })
    }
}

impl EventListener for CsvOracleLogger {
    fn on_event(&mut self, event: &SimEvent) {
        if let SimEvent::OracleTick {
            ts,
            symbol,
            fundamental,
        } = event
        {
            let line = format!("{ts},{symbol},{fundamental}\n");
            write_row(&mut self.file, "CsvOracleLogger", &line);
        }
    }
}
