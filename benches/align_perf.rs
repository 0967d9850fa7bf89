//! Micro-benchmarks of the hot paths: suffix sorting, backward search,
//! and the extension kernels.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cobalt_align::align::extension::{ExtensionEngine, SwScores};
use cobalt_align::align::{Aligner, Scratch};
use cobalt_align::encoding::encode;
use cobalt_align::index::sorter::{SaisSorter, StableSorter, SuffixSorter};
use cobalt_align::index::{GenomeIndex, Reference};
use cobalt_align::opts::AlignOpt;

fn random_dna(len: usize, mut state: u32) -> Vec<u8> {
    let mut seq = Vec::with_capacity(len);
    for _ in 0..len {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        seq.push(b"ACGT"[(state >> 16) as usize % 4]);
    }
    seq
}

fn bench_sorters(c: &mut Criterion) {
    let text = encode(&random_dna(50_000, 0x1234));
    c.bench_function("sais_50k", |b| {
        b.iter(|| SaisSorter.suffix_array(black_box(&text)))
    });
    let short = encode(&random_dna(5_000, 0x1234));
    c.bench_function("stable_5k", |b| {
        b.iter(|| StableSorter.suffix_array(black_box(&short)))
    });
}

fn bench_extension(c: &mut Criterion) {
    let scores = SwScores::default();
    let probed = ExtensionEngine::probe(scores);
    let fallback = ExtensionEngine::scalar(scores);
    let query = encode(&random_dna(150, 0x77));
    let mut target = encode(&random_dna(350, 0x88));
    target[100..250].copy_from_slice(&query);
    let profile_simd = probed.profile(&query);
    let profile_scalar = fallback.profile(&query);

    c.bench_function("extend_simd_150x350", |b| {
        b.iter(|| probed.score(black_box(&profile_simd), black_box(&target), 75))
    });
    c.bench_function("extend_scalar_150x350", |b| {
        b.iter(|| fallback.score(black_box(&profile_scalar), black_box(&target), 75))
    });
}

fn bench_map_single(c: &mut Criterion) {
    let genome = random_dna(100_000, 0xc0ffee);
    let reference =
        Reference::from_records(vec![("chr1".to_string(), encode(&genome))]).unwrap();
    let idx = GenomeIndex::build(reference, &SaisSorter, 8).unwrap();
    let opt = AlignOpt::default();
    let aligner = Aligner::new(&idx, &opt, ExtensionEngine::probe(SwScores::default()));
    let mut scratch = Scratch::new(&opt);

    let mut read = encode(&genome[40_000..40_150]);
    read[50] = (read[50] + 1) % 4;
    c.bench_function("map_single_150bp", |b| {
        b.iter(|| aligner.map_single(black_box(&read), &mut scratch))
    });
}

criterion_group!(benches, bench_sorters, bench_extension, bench_map_single);
criterion_main!(benches);
