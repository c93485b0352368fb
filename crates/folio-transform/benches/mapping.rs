use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use folio_model::basic::basic_schema;
use folio_model::{Fragment, Node, Slice};
use folio_transform::{Assoc, MapRange, Mappable, Mapping, ReplaceStep, Step, StepMap, Transform};

fn long_document(paragraphs: usize) -> Node {
    let schema = basic_schema();
    let para = schema.node_type("paragraph").unwrap();
    let children: Vec<Node> = (0..paragraphs)
        .map(|i| {
            let text = schema.text(&format!("paragraph number {i} with some text"), vec![]);
            para.create(None, Fragment::from(text), vec![])
        })
        .collect();
    schema
        .top_node_type()
        .create(None, Fragment::from_array(children), vec![])
}

fn typing_mapping(edits: usize) -> Mapping {
    let maps = (0..edits)
        .map(|i| StepMap::new(vec![MapRange::new(10 + i, 0, 1)]))
        .collect();
    Mapping::from_maps(maps)
}

fn bench_step_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_map");

    let ranges: Vec<MapRange> = (0..100).map(|i| MapRange::new(i * 10, 2, 3)).collect();
    let map = StepMap::new(ranges);
    group.bench_function("map_many_ranges", |b| {
        b.iter(|| {
            for pos in (0..1000).step_by(7) {
                black_box(map.map(black_box(pos), Assoc::After));
            }
        });
    });

    group.bench_function("invert", |b| {
        b.iter(|| black_box(map.invert()));
    });

    group.finish();
}

fn bench_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapping");
    group.sample_size(20);

    let mapping = typing_mapping(500);
    group.bench_function("map_through_500_edits", |b| {
        b.iter(|| black_box(mapping.map(black_box(400), Assoc::Before)));
    });

    let doc = long_document(200);
    let step: Step = ReplaceStep::new(50, 250, Slice::empty(), false).into();
    let mut mirrored = Mapping::new();
    mirrored.append_map(step.get_map(), None);
    mirrored.append_map(step.invert(&doc).get_map(), Some(0));
    group.bench_function("recover_through_mirror", |b| {
        b.iter(|| black_box(mirrored.map(black_box(120), Assoc::After)));
    });

    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    group.sample_size(20);

    let doc = long_document(200);
    let strong = basic_schema().mark("strong", None).unwrap();
    group.bench_function("add_mark_whole_document", |b| {
        b.iter(|| {
            let mut tr = Transform::new(doc.clone());
            tr.add_mark(0, doc.content().size(), strong.clone()).unwrap();
            black_box(tr.steps().len());
        });
    });

    group.bench_function("delete_range_across_paragraphs", |b| {
        b.iter(|| {
            let mut tr = Transform::new(doc.clone());
            tr.delete_range(20, 900).unwrap();
            black_box(tr.doc().child_count());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_step_map, bench_mapping, bench_transform);
criterion_main!(benches);
