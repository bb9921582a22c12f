use corrtools::{ser, Trace};

#[test]
fn zeroed_trace() {
    let trace = Trace::zeroed(101, 500);
    assert_eq!(trace.len(), 101);
    assert_eq!(trace.bin_width, 500);
    assert!(trace.counts.iter().all(|&c| c == 0));
}

#[test]
fn delays_span_the_trace_symmetrically() {
    let trace = Trace::zeroed(11, 100);
    let delays = trace.delays();
    assert_eq!(delays.first(), Some(&-500));
    assert_eq!(delays[5], 0);
    assert_eq!(delays.last(), Some(&500));
}

#[test]
fn tsv_writes_one_row_per_bin() {
    let trace = Trace {
        bin_width: 100,
        counts: vec![3, 1, 0, 2, 7],
    };
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    ser::tsv(&mut wtr, &trace).unwrap();
    let out = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
    assert_eq!(out, "-200\t3\n-100\t1\n0\t0\n100\t2\n200\t7\n");
}
