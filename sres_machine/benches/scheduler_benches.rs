use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use sres_machine::components::coprocessor::CoprocessorKind;
use sres_machine::Cartridge;
use sres_machine::Configuration;
use sres_machine::SerializationMethod;
use sres_machine::System;

fn system(serialization: SerializationMethod) -> System {
    let config = Configuration {
        serialization,
        ..Default::default()
    };
    let cartridge = Cartridge::new("BENCH", &[CoprocessorKind::Multiplier, CoprocessorKind::Rtc]);
    System::new(config, cartridge).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("run_frame", |b| {
        let mut system = system(SerializationMethod::Fast);
        b.iter(|| system.run());
    });

    c.bench_function("serialize_instant", |b| {
        let mut system = system(SerializationMethod::Fast);
        system.run();
        b.iter(|| black_box(system.serialize(false, "")));
    });

    for method in [SerializationMethod::Fast, SerializationMethod::Strict] {
        c.bench_function(&format!("serialize_portable_{}", method), |b| {
            let mut system = system(method);
            b.iter(|| {
                system.run();
                black_box(system.serialize(true, ""))
            });
        });
    }

    c.bench_function("unserialize", |b| {
        let mut system = system(SerializationMethod::Fast);
        system.run();
        let snapshot = system.serialize(true, "");
        b.iter(|| system.unserialize(black_box(&snapshot)).unwrap());
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
