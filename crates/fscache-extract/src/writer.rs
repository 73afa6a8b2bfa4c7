//! Streaming feature collection serializer
//!
//! [`FeatureCollectionWriter`] writes the opening fragment once, then every
//! feature as it arrives, then the closing fragment on [`finish`]. Only one
//! feature is held in memory at a time.
//!
//! [`finish`]: FeatureCollectionWriter::finish

use crate::error::Result;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

const PRETTY_FEATURE_INDENT: &str = "\n    ";

pub struct FeatureCollectionWriter<W: AsyncWrite + Unpin> {
    inner: BufWriter<W>,
    pretty: bool,
    offered: usize,
    written: usize,
}

impl<W: AsyncWrite + Unpin> FeatureCollectionWriter<W> {
    /// Write the collection header for `layer_id` and return the open writer
    pub async fn begin(inner: W, layer_id: i64, pretty: bool) -> Result<Self> {
        let mut inner = BufWriter::new(inner);
        let header = if pretty {
            format!(
                "{{\n  \"type\": \"FeatureCollection\",\n  \"layerId\": {},\n  \"features\": [",
                layer_id
            )
        } else {
            format!("{{\"type\":\"FeatureCollection\",\"layerId\":{},\"features\":[", layer_id)
        };
        inner.write_all(header.as_bytes()).await?;

        Ok(Self {
            inner,
            pretty,
            offered: 0,
            written: 0,
        })
    }

    /// Append one feature.
    ///
    /// A feature that cannot be serialized is skipped: `on_error` receives its
    /// index among all offered features, the feature and the error, and the
    /// collection stays valid. Returns whether the feature was written. Only
    /// IO failures are errors.
    pub async fn write_feature<T, F>(&mut self, feature: &T, on_error: F) -> Result<bool>
    where
        T: Serialize + ?Sized,
        F: FnOnce(usize, &T, &serde_json::Error),
    {
        let index = self.offered;
        self.offered += 1;

        let encoded = if self.pretty {
            serde_json::to_vec_pretty(feature)
        } else {
            serde_json::to_vec(feature)
        };
        let encoded = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                on_error(index, feature, &e);
                return Ok(false);
            },
        };

        if self.pretty {
            let separator = if self.written == 0 { PRETTY_FEATURE_INDENT } else { ",\n    " };
            self.inner.write_all(separator.as_bytes()).await?;
            // JSON strings never contain raw newlines, so this only indents
            let indented = String::from_utf8_lossy(&encoded).replace('\n', PRETTY_FEATURE_INDENT);
            self.inner.write_all(indented.as_bytes()).await?;
        } else {
            if self.written > 0 {
                self.inner.write_all(b",").await?;
            }
            self.inner.write_all(&encoded).await?;
        }

        self.written += 1;
        Ok(true)
    }

    /// Number of features written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Write the closing fragment, flush and hand back the underlying writer
    pub async fn finish(mut self) -> Result<W> {
        let footer: &[u8] = match (self.pretty, self.written) {
            (true, 0) => b"]\n}\n",
            (true, _) => b"\n  ]\n}\n",
            (false, _) => b"]}",
        };
        self.inner.write_all(footer).await?;
        self.inner.flush().await?;

        let mut inner = self.inner.into_inner();
        inner.shutdown().await?;
        Ok(inner)
    }
}
