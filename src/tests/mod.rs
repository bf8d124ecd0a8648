use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};

use crate::app::RecognitionService;
use crate::config::Config;
use crate::recognition::{
    Catalog, ExtractorError, ExtractorHandle, FeatureExtractor, IngestionAdapter,
};
use crate::storage::BackendLocal;

mod catalog_store;

/// Mean RGB of the prepared image, scaled to [0, 1]. Photos of similar
/// colour end up close in cosine distance.
pub struct MeanColorExtractor {
    pub calls: AtomicUsize,
}

impl MeanColorExtractor {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeatureExtractor for MeanColorExtractor {
    fn name(&self) -> &str {
        "mean-color"
    }

    fn infer(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let rgb = image.to_rgb8();
        let pixels = (rgb.width() * rgb.height()).max(1) as f32;
        let mut sums = [0f32; 3];
        for pixel in rgb.pixels() {
            for (sum, channel) in sums.iter_mut().zip(pixel.0.iter()) {
                *sum += *channel as f32;
            }
        }

        Ok(sums.iter().map(|sum| sum / pixels / 255.0).collect())
    }
}

pub fn solid_png(r: u8, g: u8, b: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(40, 30, image::Rgb([r, g, b]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("failed to encode test png");
    buf
}

/// Service over `dir` with the deterministic test extractor.
pub fn create_service(dir: &Path) -> (RecognitionService, Arc<MeanColorExtractor>) {
    let config = Config::load_with(dir).expect("failed to load config");

    let catalog_store = Arc::new(BackendLocal::new(dir.join("catalog")).expect("catalog store"));
    let catalog = Catalog::open(catalog_store).expect("failed to open catalog");
    let images = Arc::new(BackendLocal::new(dir.join("images")).expect("image store"));

    let extractor = Arc::new(MeanColorExtractor::new());
    let handle = ExtractorHandle::preloaded(extractor.clone());
    let adapter = IngestionAdapter::new(Arc::new(handle), 16);

    (
        RecognitionService::new(catalog, adapter, images, config),
        extractor,
    )
}
