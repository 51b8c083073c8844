//! Drives a small CSV through the async binding end to end: register,
//! plan, collect in both transfer modes, then stream the result in slices.

use anyhow::Result;
use fusion_client::{CsvReadOptions, Runtime, RuntimeConfig, TransferMode, WriteOptions};
use futures::TryStreamExt;
use std::io::Write;
use std::path::Path;

const BATCH_LENGTH: usize = 2;
const TOTAL: usize = 4096;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let dir = tempfile::tempdir()?;
    let csv = create_some_records(dir.path())?;

    for mode in [TransferMode::ZeroCopy, TransferMode::Copy] {
        let config = RuntimeConfig::new().with_worker_threads(2).with_transfer_mode(mode);
        let runtime = Runtime::new(config)?;
        let session = runtime.create_session()?;
        session
            .register_csv("readings", &csv, Some(CsvReadOptions::new().with_has_header(true)))
            .await?;

        let df = session
            .sql("SELECT sensor, count(*) AS n, avg(value) AS mean FROM readings GROUP BY sensor ORDER BY sensor")
            .await?;
        println!("{mode:?}: {} groups", df.count().await?);
        println!("{}", df.to_string_async().await?);

        let collected = df.collect().await?;
        log::info!("collected {} rows in {} batches", collected.num_rows(), collected.batches.len());

        let raw = session.sql("SELECT * FROM readings WHERE value > 0.5").await?;
        let mut stream = raw.execute_stream().await?;
        let mut count = 0;
        while let Some(batch) = stream.try_next().await? {
            println!("Received Batch {count}, containing {}", batch.num_rows());
            let n_slices = batch.num_rows() / BATCH_LENGTH;
            for i in 0..n_slices {
                let slice = batch.slice(i * BATCH_LENGTH, BATCH_LENGTH);
                log::debug!("Slice {i}: {}", slice.num_rows());
            }
            count += 1;
        }
        stream.close();

        let out = dir.path().join(format!("{mode:?}.parquet"));
        df.write_parquet(&out.to_string_lossy(), Some(WriteOptions::new().with_single_file_output(true)))
            .await?;
        println!("wrote {}", out.display());

        raw.close();
        df.close();
        session.close();
        runtime.close();
    }

    Ok(())
}

fn create_some_records(dir: &Path) -> Result<String> {
    let path = dir.join("readings.csv");
    let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
    writeln!(file, "id,sensor,value")?;
    for id in 0..TOTAL {
        let value = (id * 7919 % 1000) as f64 / 1000.0;
        writeln!(file, "{id},s{},{value}", id % 8)?;
    }
    file.flush()?;
    Ok(path.to_string_lossy().into_owned())
}
