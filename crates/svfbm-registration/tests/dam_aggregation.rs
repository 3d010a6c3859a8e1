use svfbm_core::image::{ImageGeometry, VolumeBuffer};
use svfbm_core::transform::{LocalTransform, LocalTransformKind};
use svfbm_registration::aggregator::{Aggregator, KernelAggregator, MEstimationAggregator};
use svfbm_registration::block::{BlockSampler, SampledBlocks};
use svfbm_registration::matcher::BlockEstimate;
use svfbm_registration::optimizer::StopCondition;

/// Textured everywhere except a flat slab at `10 <= x < 14`.
fn slab_volume() -> VolumeBuffer {
    let geometry = ImageGeometry::with_size([24, 4, 4]).unwrap();
    let mut data = Vec::with_capacity(geometry.num_voxels());
    for z in 0..4 {
        for y in 0..4 {
            for x in 0..24 {
                let textured = !(10..14).contains(&x) && (x + y + z) % 2 == 1;
                data.push(if textured { 100.0 } else { 0.0 });
            }
        }
    }
    VolumeBuffer::new(geometry, data).unwrap()
}

/// Blocks left of the slab move by +1 along x, blocks right of it by -1.
fn estimates(sampled: &SampledBlocks, geometry: &ImageGeometry<3>) -> Vec<BlockEstimate> {
    sampled
        .blocks
        .iter()
        .zip(&sampled.dams)
        .map(|(block, &is_dam)| {
            let center = block.center(geometry);
            let t = if center[0] < 12.0 { 1.0 } else { -1.0 };
            BlockEstimate {
                center,
                transform: LocalTransform::from_parameters(LocalTransformKind::Translation, center, &[t, 0.0, 0.0]),
                score: 1.0,
                confidence: 1.0,
                is_dam,
                stop: StopCondition::GridExhausted,
            }
        })
        .collect()
}

#[test]
fn test_sampled_dams_shield_the_far_side() {
    let volume = slab_volume();
    let geometry = *volume.geometry();
    let sampled = BlockSampler::new(4, 2, 1.0, 1.0).with_dam(2.0).sample(&volume);

    // Only the tile inside the slab is rejected; its neighbours become dams.
    assert_eq!(sampled.tiles, 11);
    assert_eq!(sampled.len(), 10);
    let dam_centers: Vec<f64> = sampled
        .blocks
        .iter()
        .zip(&sampled.dams)
        .filter(|(_, &d)| d)
        .map(|(b, _)| b.center_index()[0])
        .collect();
    assert_eq!(dam_centers, vec![1.5, 9.5, 13.5, 21.5]);

    let all = estimates(&sampled, &geometry);
    // Dams keep contributing as data points; only non-dam blocks beyond
    // the slab are removed.
    let left_only: Vec<BlockEstimate> = all
        .iter()
        .filter(|e| e.is_dam || e.center[0] < 12.0)
        .cloned()
        .collect();

    let aggregators: Vec<Box<dyn Aggregator>> = vec![
        Box::new(KernelAggregator::new(3.0)),
        Box::new(MEstimationAggregator::new(3.0, 7.5)),
    ];
    for aggregator in &aggregators {
        let with_far = aggregator.fit(&all, &geometry).unwrap();
        let without_far = aggregator.fit(&left_only, &geometry).unwrap();
        for z in 0..4 {
            for y in 0..4 {
                for x in 0..10 {
                    let i = (z * 4 + y) * 24 + x;
                    let (a, b) = (with_far.get(i), without_far.get(i));
                    assert!(
                        (0..3).all(|c| (a[c] - b[c]).abs() < 1e-9),
                        "{} at x = {}: {:?} vs {:?}",
                        aggregator.name(),
                        x,
                        a,
                        b
                    );
                    assert!(a[0] > 0.0);
                }
            }
        }
    }
}
