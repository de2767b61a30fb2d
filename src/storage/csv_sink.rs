//! 每日 CSV 文件持久化
//!
//! 文件名为 `{YYYYMMDD}_{exchange}.csv`。空值写为空单元格，与数值 0 区分。
//! 先写临时文件再重命名，单次 flush 要么完整落盘要么不改变已有文件。

use crate::common::{AppError, ExchangeId, Result, Ticker};
use crate::storage::Sink;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct CsvSink {
    output_dir: PathBuf,
}

impl CsvSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn file_path(&self, exchange: &ExchangeId, day: NaiveDate) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.csv", day.format("%Y%m%d"), exchange))
    }

    fn write_atomically(&self, path: &Path, tickers: &[Ticker]) -> Result<usize> {
        fs::create_dir_all(&self.output_dir)?;

        // 重启后同一天的文件已存在时，旧数据在前、新数据在后
        let mut rows = Vec::new();
        if path.exists() {
            let mut reader = csv::Reader::from_path(path)?;
            for record in reader.deserialize::<Ticker>() {
                rows.push(record?);
            }
            debug!(target: "CSV存储", path = %path.display(), existing = rows.len(), "追加到已有文件");
        }

        let tmp_path = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)?;
            for ticker in rows.iter().chain(tickers.iter()) {
                writer.serialize(ticker)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(rows.len() + tickers.len())
    }
}

impl Sink for CsvSink {
    fn flush(&self, exchange: &ExchangeId, tickers: &[Ticker], day: NaiveDate) -> Result<()> {
        let path = self.file_path(exchange, day);
        match self.write_atomically(&path, tickers) {
            Ok(total) => {
                info!(target: "CSV存储", %exchange, path = %path.display(), written = tickers.len(), total, "ticker文件已保存");
                Ok(())
            }
            Err(e) => Err(AppError::SinkError(format!(
                "写入 {} 失败: {}",
                path.display(),
                e
            ))),
        }
    }
}
