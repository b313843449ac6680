// Chart Pipeline Integration Tests
// Builds a realistic workload result set, derives the workload summary from
// it, feeds every chart, and checks the rendered output a report would
// consume.

use anyhow::Result;
use pretty_assertions::assert_eq;

use loadstats::{
    AtomicAvgChart, AtomicHistogramChart, AtomicStackedAreaChart, CellValue, Chart, ChartRender,
    Iteration, IterationBuilder, LoadProfileChart, MainHistogramChart, MainStackedAreaChart,
    MainStatsTable, OutputData, OutputItem, OutputKind, OutputMeta, OutputStackedAreaChart,
    WorkloadSummaryBuilder,
};

/// A run of 20 iterations where every fifth one fails mid-way.
fn build_workload() -> Result<Vec<Iteration>> {
    let mut iterations = Vec::new();
    let mut clock = 1_700_000_000.0;
    for index in 0..20usize {
        let failed = index % 5 == 4;
        let duration = 2.0 + (index as f64) * 0.05;
        let mut builder = IterationBuilder::new()
            .timestamp(clock)
            .duration(if failed { duration / 2.0 } else { duration })
            .idle_duration(0.25)
            .atomic_action("server.boot", duration * 0.6);
        if failed {
            builder = builder.error("ServerFault", "boot never completed");
        } else {
            // The verify step only runs when boot survived.
            builder = builder.atomic_action("server.verify", duration * 0.3);
        }
        iterations.push(builder.build()?);
        clock += duration + 0.25;
    }
    Ok(iterations)
}

#[test]
fn test_summary_then_charts_end_to_end() -> Result<()> {
    let iterations = build_workload()?;

    let mut summary_builder = WorkloadSummaryBuilder::new();
    for iteration in &iterations {
        summary_builder.scan_iteration(iteration)?;
    }
    let summary = summary_builder.build();
    assert_eq!(summary.iterations_count, 20);
    assert_eq!(summary.iterations_failed, 4);
    assert_eq!(summary.atomic.len(), 2);

    let mut main_area = MainStackedAreaChart::new(&summary);
    let mut atomic_area = AtomicStackedAreaChart::new(&summary);
    let mut atomic_avg = AtomicAvgChart::new(&summary);
    let mut main_histogram = MainHistogramChart::new(&summary);
    let mut atomic_histogram = AtomicHistogramChart::new(&summary);
    let mut stats_table = MainStatsTable::new(&summary)?;
    let mut load_profile = LoadProfileChart::new(&summary)?;

    for iteration in &iterations {
        main_area.add_iteration(iteration)?;
        atomic_area.add_iteration(iteration)?;
        atomic_avg.add_iteration(iteration)?;
        main_histogram.add_iteration(iteration)?;
        atomic_histogram.add_iteration(iteration)?;
        stats_table.add_iteration(iteration)?;
        load_profile.add_iteration(iteration)?;
    }

    // Stacked areas: all series cover every iteration index.
    match main_area.render() {
        ChartRender::Series(series) => {
            let names: Vec<&str> = series.iter().map(|entry| entry.name.as_str()).collect();
            assert_eq!(names, ["duration", "idle_duration", "failed_duration"]);
            for entry in &series {
                assert_eq!(entry.points.len(), 20);
            }
        }
        other => panic!("expected series, got {other:?}"),
    }

    match atomic_area.render() {
        ChartRender::Series(series) => {
            let verify = series
                .iter()
                .find(|entry| entry.name == "server.verify")
                .unwrap();
            // Failed iterations default the missing action to zero, keeping
            // all series aligned to the iteration index.
            assert_eq!(verify.points.len(), 20);
            let zeroed: Vec<f64> = verify
                .points
                .iter()
                .filter(|(_, value)| *value == 0.0)
                .map(|(order, _)| *order)
                .collect();
            assert_eq!(zeroed, [5.0, 10.0, 15.0, 20.0]);
        }
        other => panic!("expected series, got {other:?}"),
    }

    // Averages exist for both actions.
    match atomic_avg.render() {
        ChartRender::Pairs(pairs) => {
            assert_eq!(pairs.len(), 2);
            for (name, average) in &pairs {
                assert!(average.is_some(), "no average for {name}");
            }
        }
        other => panic!("expected pairs, got {other:?}"),
    }

    // Histograms: three views over 20 samples each.
    match main_histogram.render() {
        ChartRender::Histogram(histogram) => {
            assert_eq!(histogram.views.len(), 3);
            for group in &histogram.data {
                let counted: u64 = group[0].values.iter().map(|(_, count)| count).sum();
                assert_eq!(counted, 20);
            }
        }
        other => panic!("expected histogram, got {other:?}"),
    }
    match atomic_histogram.render() {
        ChartRender::Histogram(histogram) => {
            assert_eq!(histogram.data[0].len(), 2);
        }
        other => panic!("expected histogram, got {other:?}"),
    }

    // Stats table: a row per action plus the total row.
    match stats_table.render() {
        ChartRender::Table(table) => {
            assert_eq!(table.rows.len(), 3);
            let total = table
                .rows
                .iter()
                .find(|row| row[0] == CellValue::from("total"))
                .unwrap();
            assert_eq!(total[8], CellValue::Int(20));
            assert_eq!(total[7], CellValue::Text("80.0%".to_string()));
        }
        other => panic!("expected table, got {other:?}"),
    }

    // Load profile: roughly one iteration running at any time.
    match load_profile.render() {
        ChartRender::Series(series) => {
            let points = &series[0].points;
            assert!(points.len() > 50);
            let peak = points.iter().map(|(_, running)| *running).fold(0.0, f64::max);
            assert!(peak <= 1.5, "serial run should never exceed ~1 parallel, got {peak}");
        }
        other => panic!("expected series, got {other:?}"),
    }

    Ok(())
}

#[test]
fn test_scenario_output_pipeline() -> Result<()> {
    let iterations: Vec<Iteration> = (0..4)
        .map(|index| {
            IterationBuilder::new()
                .duration(1.0)
                .additive_output(OutputItem {
                    title: "requests per iteration".to_string(),
                    description: String::new(),
                    chart_plugin: "StackedArea".to_string(),
                    data: OutputData::Additive(vec![
                        ("sent".to_string(), 10.0 + index as f64),
                        ("acked".to_string(), 9.0 + index as f64),
                    ]),
                    label: "count".to_string(),
                    axis_label: "iteration".to_string(),
                })
                .build()
                .unwrap()
        })
        .collect();

    let mut summary_builder = WorkloadSummaryBuilder::new();
    for iteration in &iterations {
        summary_builder.scan_iteration(iteration)?;
    }
    let summary = summary_builder.build();

    // Validate then feed the additive output of each iteration.
    let first_item = &iterations[0].output.additive[0];
    loadstats::validate_output(OutputKind::Additive, first_item)?;

    let mut chart =
        OutputStackedAreaChart::new(&summary, OutputMeta::from_item(first_item));
    for iteration in &iterations {
        for item in &iteration.output.additive {
            if let OutputData::Additive(data) = &item.data {
                chart.add_data(data)?;
            }
        }
    }

    match chart.render() {
        ChartRender::Output(output) => {
            assert_eq!(output.title, "requests per iteration");
            assert_eq!(output.widget, "StackedArea");
            match output.data.as_ref() {
                ChartRender::Series(series) => {
                    assert_eq!(series.len(), 2);
                    assert_eq!(series[0].points.len(), 4);
                }
                other => panic!("expected series, got {other:?}"),
            }
        }
        other => panic!("expected output envelope, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_render_output_serializes_to_json() -> Result<()> {
    let iterations = build_workload()?;
    let mut summary_builder = WorkloadSummaryBuilder::new();
    for iteration in &iterations {
        summary_builder.scan_iteration(iteration)?;
    }
    let summary = summary_builder.build();

    let mut table = MainStatsTable::new(&summary)?;
    for iteration in &iterations {
        table.add_iteration(iteration)?;
    }
    let json = serde_json::to_value(table.render())?;
    assert!(json.get("cols").is_some());
    assert_eq!(json["rows"].as_array().unwrap().len(), 3);
    Ok(())
}
