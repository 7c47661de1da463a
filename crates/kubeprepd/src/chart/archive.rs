//! Chart packaging.
//!
//! A chart archive is a gzipped tar with the standard chart layout
//! (`<chart-id>/Chart.yaml`, `<chart-id>/templates/...`). Entries carry a
//! fixed mtime and mode so packaging the same chart twice yields identical
//! bytes.

use flate2::write::GzEncoder;
use flate2::Compression;
use kubeprep_common::{ProvisionError, Result};

use super::Chart;

pub fn package(chart: &Chart) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    {
        let mut builder = tar::Builder::new(&mut encoder);
        for doc in &chart.documents {
            let data = doc.content.as_bytes();
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{}/{}", chart.id, doc.path), data)
                .map_err(ProvisionError::Io)?;
        }
        builder.finish().map_err(ProvisionError::Io)?;
    }
    encoder.finish().map_err(ProvisionError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartDocument;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn chart() -> Chart {
        Chart {
            id: "ckad-beginner".to_string(),
            version: "0.6.0".to_string(),
            documents: vec![
                ChartDocument {
                    path: "Chart.yaml".to_string(),
                    content: "name: ckad-beginner\n".to_string(),
                },
                ChartDocument {
                    path: "templates/namespaces.yaml".to_string(),
                    content: "kind: Namespace\n".to_string(),
                },
            ],
        }
    }

    #[test]
    fn packages_chart_layout() {
        let bytes = package(&chart()).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut paths = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            paths.push(entry.path().unwrap().to_string_lossy().into_owned());
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            assert!(!content.is_empty());
        }
        assert_eq!(
            paths,
            vec!["ckad-beginner/Chart.yaml", "ckad-beginner/templates/namespaces.yaml"]
        );
    }

    #[test]
    fn packaging_is_deterministic() {
        let chart = chart();
        assert_eq!(package(&chart).unwrap(), package(&chart).unwrap());
    }
}
