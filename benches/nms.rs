// 该文件是 RTMDet 推理项目的一部分。
// benches/nms.rs - 非极大值抑制性能测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::prelude::*;
use rtmdet::{bbox::BBox, decode::Candidate, nms};

fn candidates(count: usize, classes: u32) -> Vec<Candidate> {
  let mut rng = StdRng::seed_from_u64(42);
  (0..count)
    .map(|index| {
      let size = rng.gen_range(16.0..144.0);
      Candidate {
        bbox: BBox::from_xywh(rng.gen_range(0.0..600.0), rng.gen_range(0.0..600.0), size, size),
        class_id: rng.gen_range(0..classes),
        score: rng.gen_range(0.0..1.0),
        index,
      }
    })
    .collect()
}

fn bench_suppress(c: &mut Criterion) {
  let mut group = c.benchmark_group("nms_suppress");
  for count in [100usize, 1000, 5000] {
    let input = candidates(count, 80);
    group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
      b.iter(|| nms::suppress(black_box(input.clone()), black_box(0.45)))
    });
  }
  group.finish();
}

fn bench_single_class(c: &mut Criterion) {
  let input = candidates(1000, 1);
  c.bench_function("nms_single_class_1000", |b| {
    b.iter(|| nms::suppress(black_box(input.clone()), black_box(0.45)))
  });
}

criterion_group!(benches, bench_suppress, bench_single_class);
criterion_main!(benches);
