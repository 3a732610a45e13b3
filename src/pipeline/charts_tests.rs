use super::*;
use crate::ingest::{MemorySource, SourceFormat};
use crate::table::{ColumnType, Schema};

fn csv(text: &str) -> Table { crate::ingest::parse_csv(text).unwrap() }

const OWID: &str = "owid/vaccinations.json";

fn owid_source() -> SourceSpec { SourceSpec::json_series(OWID, "data") }

fn owid() -> MemorySource {
    MemorySource::new().with(
        OWID,
        r#"[
            {"country": "France", "iso_code": "FRA", "data": [
                {"date": "2021-01-01", "people_vaccinated_per_hundred": 10},
                {"date": "2021-06-01", "people_vaccinated_per_hundred": 50}
            ]},
            {"country": "Germany", "iso_code": "DEU", "data": [
                {"date": "2021-06-01", "people_vaccinated_per_hundred": 70}
            ]},
            {"country": "World", "iso_code": "OWID_WRL", "data": [
                {"date": "2021-01-02", "people_vaccinated": 30, "people_fully_vaccinated": 10, "total_boosters": 1},
                {"date": "2021-01-01", "people_vaccinated": 12, "people_fully_vaccinated": 2},
                {"date": "2021-01-03", "people_vaccinated": 5, "people_fully_vaccinated": 8, "total_boosters": 4}
            ]}
        ]"#,
    )
}

fn series(out: ChartOutput) -> ChartData {
    match out {
        ChartOutput::Series(c) => c,
        other => panic!("expected series, got {:?}", other),
    }
}

fn records(out: ChartOutput) -> Vec<EntityRecord> {
    match out {
        ChartOutput::Records(r) => r,
        other => panic!("expected records, got {:?}", other),
    }
}

#[tokio::test]
async fn regional_average_counts_missing_members_as_zero() {
    let spec = ChartSpec::RegionalAverage(RegionalAverage {
        source: owid_source(),
        key_column: "iso_code".into(),
        date_column: Some("date".into()),
        metric: "people_vaccinated_per_hundred".into(),
        regions: vec![
            Region { name: "Europe".into(), members: vec!["FRA".into(), "DEU".into(), "ITA".into()] },
            Region { name: "Asia".into(), members: vec!["JPN".into()] },
        ],
        statistic: Statistic::Mean,
    });
    let chart = series(spec.execute(&owid()).await.unwrap());
    assert_eq!(chart.labels, vec!["Europe", "Asia"]);
    assert_eq!(chart.datasets.len(), 1);
    assert_eq!(chart.datasets[0].data, vec![40.0, 0.0]);
}

#[tokio::test]
async fn latest_per_entity_carries_names() {
    let spec = ChartSpec::LatestPerEntity(LatestPerEntity {
        source: owid_source(),
        key_column: "iso_code".into(),
        date_column: Some("date".into()),
        metrics: vec!["people_vaccinated_per_hundred".into()],
        name_column: Some("country".into()),
        allowed: Some(vec!["FRA".into(), "OWID_WRL".into()]),
        require: Vec::new(),
    });
    let recs = records(spec.execute(&owid()).await.unwrap());
    assert_eq!(recs.len(), 2);
    let fra = recs.iter().find(|r| r.entity == "FRA").unwrap();
    assert_eq!(fra.value("people_vaccinated_per_hundred"), Some(50.0));
    assert_eq!(fra.name.as_deref(), Some("France"));
    let world = recs.iter().find(|r| r.entity == "OWID_WRL").unwrap();
    assert_eq!(world.value("people_vaccinated_per_hundred"), Some(0.0));
}

#[tokio::test]
async fn policy_map_keeps_last_row_with_both_metrics() {
    let src = MemorySource::new().with(
        "owid-covid-data.csv",
        "location,stringency_index,people_fully_vaccinated_per_hundred\n\
         France,50,10\n\
         France,60,20\n\
         France,,30\n\
         Chile,70,\n\
         Peru,40,5\n\
         Peru,0,8\n",
    );
    let spec = ChartSpec::LatestPerEntity(LatestPerEntity {
        source: SourceSpec::csv("owid-covid-data.csv"),
        key_column: "location".into(),
        date_column: None,
        metrics: vec!["stringency_index".into(), "people_fully_vaccinated_per_hundred".into()],
        name_column: None,
        allowed: None,
        require: vec!["stringency_index".into(), "people_fully_vaccinated_per_hundred".into()],
    });
    let recs = records(spec.execute(&src).await.unwrap());
    let cells: Vec<(&str, Option<f64>, Option<f64>)> = recs
        .iter()
        .map(|r| (r.entity.as_str(), r.value("stringency_index"), r.value("people_fully_vaccinated_per_hundred")))
        .collect();
    // France's trailing row lacks a stringency reading; Chile never has both
    assert_eq!(cells, vec![("France", Some(60.0), Some(20.0)), ("Peru", Some(0.0), Some(8.0))]);
}

#[tokio::test]
async fn required_column_must_exist() {
    let src = MemorySource::new().with("p.csv", "location,v\nA,1\n");
    let spec = ChartSpec::LatestPerEntity(LatestPerEntity {
        source: SourceSpec::csv("p.csv"),
        key_column: "location".into(),
        date_column: None,
        metrics: vec!["v".into()],
        name_column: None,
        allowed: None,
        require: vec!["stringency_index".into()],
    });
    assert_eq!(spec.execute(&src).await.unwrap_err().code_str(), "schema_error");
}

#[tokio::test]
async fn time_series_sorts_dates_and_stacks_layers() {
    let spec = TimeSeries {
        source: owid_source(),
        key_column: "iso_code".into(),
        entity: "OWID_WRL".into(),
        date_column: "date".into(),
        series: vec![
            SeriesSpec { label: "full".into(), column: "people_fully_vaccinated".into(), minus: None },
            SeriesSpec {
                label: "partial".into(),
                column: "people_vaccinated".into(),
                minus: Some("people_fully_vaccinated".into()),
            },
            SeriesSpec { label: "boosters".into(), column: "total_boosters".into(), minus: None },
        ],
        stacked: false,
    };
    let chart = series(ChartSpec::TimeSeries(spec.clone()).execute(&owid()).await.unwrap());
    assert_eq!(chart.labels, vec!["2021-01-01", "2021-01-02", "2021-01-03"]);
    assert_eq!(chart.dataset("full").unwrap().data, vec![2.0, 10.0, 8.0]);
    // negative difference clamps to zero
    assert_eq!(chart.dataset("partial").unwrap().data, vec![10.0, 20.0, 0.0]);
    assert_eq!(chart.dataset("boosters").unwrap().data, vec![0.0, 1.0, 4.0]);

    let stacked = TimeSeries { stacked: true, ..spec };
    match ChartSpec::TimeSeries(stacked).execute(&owid()).await.unwrap() {
        ChartOutput::Stacked(s) => {
            assert_eq!(s.series.len(), 3);
            assert_eq!(s.series[2].points[1], [30.0, 31.0]);
        }
        other => panic!("expected stacked, got {:?}", other),
    }
}

#[tokio::test]
async fn time_series_for_unknown_entity_is_empty() {
    let spec = ChartSpec::TimeSeries(TimeSeries {
        source: owid_source(),
        key_column: "iso_code".into(),
        entity: "ATA".into(),
        date_column: "date".into(),
        series: vec![SeriesSpec { label: "v".into(), column: "people_vaccinated".into(), minus: None }],
        stacked: false,
    });
    assert!(spec.execute(&owid()).await.unwrap().is_empty());
}

#[tokio::test]
async fn yearly_delta_per_joined_entity() {
    let src = MemorySource::new()
        .with("vaccination-data.csv", "COUNTRY,TOTAL_VACCINATIONS\nFrance,1\nSpain,2\n")
        .with(
            "who.csv",
            "Country,Date_reported,Cumulative_deaths\n\
             France,2020-06-30,60\n\
             France,2020-12-31,100\n\
             France,2021-12-31,250\n\
             France,2022-12-31,240\n\
             Spain,2020-12-31,10\n",
        );
    let spec = ChartSpec::YearlyDelta(YearlyDelta {
        snapshot: JoinSide { source: SourceSpec::csv("vaccination-data.csv"), key_column: "COUNTRY".into(), date_column: None },
        series: JoinSide {
            source: SourceSpec {
                schema: Schema::new().field("Date_reported", ColumnType::Date).field("Cumulative_deaths", ColumnType::Float64),
                ..SourceSpec::csv("who.csv")
            },
            key_column: "Country".into(),
            date_column: Some("Date_reported".into()),
        },
        cumulative_column: "Cumulative_deaths".into(),
        entities: vec!["France".into(), "Spain".into(), "Italy".into()],
        years: vec![2020, 2021, 2022],
    });
    let chart = series(spec.execute(&src).await.unwrap());
    assert_eq!(chart.labels, vec!["2020", "2021", "2022"]);
    assert_eq!(chart.datasets.len(), 2);
    assert_eq!(chart.dataset("France").unwrap().data, vec![100.0, 150.0, 0.0]);
    assert_eq!(chart.dataset("Spain").unwrap().data, vec![10.0, 0.0, 0.0]);
    assert!(chart.dataset("Italy").is_none());
}

#[tokio::test]
async fn yearly_delta_without_series_date_is_config_error() {
    let spec = ChartSpec::YearlyDelta(YearlyDelta {
        snapshot: JoinSide { source: SourceSpec::csv("a.csv"), key_column: "k".into(), date_column: None },
        series: JoinSide { source: SourceSpec::csv("b.csv"), key_column: "k".into(), date_column: None },
        cumulative_column: "v".into(),
        entities: vec![],
        years: vec![2021],
    });
    assert_eq!(spec.execute(&MemorySource::new()).await.unwrap_err().code_str(), "config_error");
}

#[tokio::test]
async fn paired_yearly_mean_labels_metric_and_year() {
    let src = MemorySource::new()
        .with("vax.csv", "country,date,v\nA,2021-01-01,10\nA,2021-06-01,20\nA,2022-01-01,30\nB,2021-01-01,1\n")
        .with("hosp.csv", "country,date,h\nA,2021-03-01,5\n");
    let side = |loc: &str, metric: &str, label: &str| MetricSide {
        side: JoinSide { source: SourceSpec::csv(loc), key_column: "country".into(), date_column: Some("date".into()) },
        metric: metric.into(),
        label: label.into(),
    };
    let spec = ChartSpec::PairedYearlyMean(PairedYearlyMean {
        left: side("vax.csv", "v", "Vax"),
        right: side("hosp.csv", "h", "Hosp"),
        entities: vec!["A".into(), "B".into()],
        years: vec![2021, 2022],
        statistic: Statistic::Mean,
    });
    let chart = series(spec.execute(&src).await.unwrap());
    assert_eq!(chart.labels, vec!["A"]);
    let labels: Vec<&str> = chart.datasets.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["Vax (2021)", "Hosp (2021)", "Vax (2022)", "Hosp (2022)"]);
    assert_eq!(chart.dataset("Vax (2021)").unwrap().data, vec![15.0]);
    assert_eq!(chart.dataset("Hosp (2021)").unwrap().data, vec![5.0]);
    assert_eq!(chart.dataset("Hosp (2022)").unwrap().data, vec![0.0]);
}

fn life_expectancy() -> MemorySource {
    MemorySource::new().with(
        "owid.csv",
        "iso_code,life_expectancy,total_vaccinations,population\n\
         A,72.5,100,10\n\
         B,74,300,10\n\
         C,81,50,0\n\
         D,83,20,10\n\
         E,,5,10\n",
    )
}

fn banded(key_column: Option<&str>, allowed: Option<Vec<String>>) -> BandedRate {
    BandedRate {
        source: SourceSpec::csv("owid.csv"),
        band_column: "life_expectancy".into(),
        width: 5.0,
        numerator: "total_vaccinations".into(),
        denominator: "population".into(),
        scale: 1.0,
        positive_only: true,
        label: "rate".into(),
        key_column: key_column.map(str::to_string),
        allowed,
        statistic: Statistic::Mean,
    }
}

#[tokio::test]
async fn banded_rate_averages_positive_rates_per_band() {
    let run = |spec: BandedRate| async move { ChartSpec::BandedRate(spec).execute(&life_expectancy()).await };
    let chart = series(run(banded(None, None)).await.unwrap());
    assert_eq!(chart.labels, vec!["70", "80"]);
    assert_eq!(chart.datasets[0].data, vec![20.0, 2.0]);

    let allowed = Some(vec!["A".to_string(), "D".to_string()]);
    let chart = series(run(banded(Some("iso_code"), allowed.clone())).await.unwrap());
    assert_eq!(chart.datasets[0].data, vec![10.0, 2.0]);

    let err = run(banded(None, allowed)).await.unwrap_err();
    assert_eq!(err.code_str(), "config_error");
}

#[tokio::test]
async fn banded_rate_applies_configured_statistic() {
    let run = |statistic| async move {
        let spec = ChartSpec::BandedRate(BandedRate { statistic, ..banded(None, None) });
        series(spec.execute(&life_expectancy()).await.unwrap()).datasets[0].data.clone()
    };
    assert_eq!(run(Statistic::Sum).await, vec![40.0, 2.0]);
    assert_eq!(run(Statistic::Count).await, vec![2.0, 1.0]);
}

#[tokio::test]
async fn box_plot_groups_by_coverage_band() {
    let src = MemorySource::new().with(
        "owid.csv",
        "people_fully_vaccinated_per_hundred,gdp_per_capita\n5,1000\n7,2000\n15,3000\n,4000\n12,\n",
    );
    let spec = ChartSpec::BoxPlot(BoxPlot {
        source: SourceSpec::csv("owid.csv"),
        band_column: "people_fully_vaccinated_per_hundred".into(),
        width: 10.0,
        value_column: "gdp_per_capita".into(),
        require: vec!["people_fully_vaccinated_per_hundred".into(), "gdp_per_capita".into()],
    });
    match spec.execute(&src).await.unwrap() {
        ChartOutput::Boxes(b) => {
            let labels: Vec<&str> = b.iter().map(|g| g.label.as_str()).collect();
            assert_eq!(labels, vec!["0-10", "10-20"]);
            assert_eq!(b[0].stats.median, 1500.0);
            assert_eq!(b[0].stats.count, 2);
            assert_eq!(b[1].stats.count, 1);
            assert!(b[0].outliers.is_empty());
        }
        other => panic!("expected boxes, got {:?}", other),
    }
}

#[tokio::test]
async fn per_capita_uses_latest_rated_row_and_zero_fills_extras() {
    let src = MemorySource::new().with(
        "owid.csv",
        "iso_code,location,date,total_vaccinations,population,male_smokers,female_smokers\n\
         USA,United States,2021-01-01,100,1000,20,\n\
         USA,United States,2021-02-01,,1000,20,18\n\
         FRA,France,2021-01-01,50,0,30,30\n\
         BRA,Brazil,2021-01-01,10,100,,\n\
         CHN,China,2021-01-01,10,100,50,2\n",
    );
    let spec = ChartSpec::PerCapita(PerCapita {
        source: SourceSpec::csv("owid.csv"),
        key_column: "iso_code".into(),
        date_column: Some("date".into()),
        numerator: "total_vaccinations".into(),
        denominator: "population".into(),
        scale: 1000.0,
        extra: vec!["male_smokers".into(), "female_smokers".into()],
        name_column: Some("location".into()),
        allowed: Some(vec!["USA".into(), "FRA".into(), "BRA".into()]),
        positive_only: true,
        rate_label: "rate".into(),
    });
    let recs = records(spec.execute(&src).await.unwrap());
    let keys: Vec<&str> = recs.iter().map(|r| r.entity.as_str()).collect();
    assert_eq!(keys, vec!["USA", "BRA"]);
    assert_eq!(recs[0].value("rate"), Some(100.0));
    assert_eq!(recs[0].value("male_smokers"), Some(20.0));
    assert_eq!(recs[0].value("female_smokers"), Some(0.0));
    assert_eq!(recs[0].name.as_deref(), Some("United States"));
    assert_eq!(recs[1].value("male_smokers"), Some(0.0));
}

#[test]
fn rate_join_defaults_allow_list_to_left_keys() {
    let left = crate::ingest::parse_csv("iso_code,total,population\nZAF,30,60\nGBR,10,0\nIND,5,10\n").unwrap();
    let right = crate::ingest::parse_csv("c3,gini\nIND,35.7\nZAF,63\nGBR,\n").unwrap();
    let spec = RateJoin {
        left: JoinSide { source: SourceSpec::csv("l"), key_column: "iso_code".into(), date_column: None },
        right: JoinSide { source: SourceSpec::csv("r"), key_column: "c3".into(), date_column: None },
        numerator: ColumnRef::left("total"),
        denominator: ColumnRef::left("population"),
        scale: 100.0,
        extra: vec![ColumnRef::right("gini")],
        name: None,
        allowed: None,
        positive_only: true,
        rate_label: "rate".into(),
    };
    let recs = spec.records(&left, &right).unwrap();
    let keys: Vec<&str> = recs.iter().map(|r| r.entity.as_str()).collect();
    assert_eq!(keys, vec!["ZAF", "IND"]);
    assert_eq!(recs[0].value("rate"), Some(50.0));
    assert_eq!(recs[0].value("gini"), Some(63.0));

    let missing = RateJoin { extra: vec![ColumnRef::right("wealth")], ..spec };
    assert_eq!(missing.records(&left, &right).unwrap_err().code_str(), "schema_error");
}

fn dated_rate_join(numerator: ColumnRef, denominator: ColumnRef) -> RateJoin {
    RateJoin {
        left: JoinSide { source: SourceSpec::csv("l"), key_column: "iso_code".into(), date_column: Some("date".into()) },
        right: JoinSide { source: SourceSpec::csv("r"), key_column: "c3".into(), date_column: None },
        numerator,
        denominator,
        scale: 1.0,
        extra: vec![ColumnRef::right("gini")],
        name: None,
        allowed: Some(vec!["A".into()]),
        positive_only: true,
        rate_label: "rate".into(),
    }
}

#[test]
fn rate_join_skips_trailing_row_without_data() {
    let left = csv("iso_code,date,total,population\nA,2021-01-01,50,100\nA,2021-01-02,,100\n");
    let right = csv("c3,gini\nA,40\n");
    let recs = dated_rate_join(ColumnRef::left("total"), ColumnRef::left("population")).records(&left, &right).unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].entity, "A");
    assert_eq!(recs[0].value("rate"), Some(0.5));
    assert_eq!(recs[0].value("gini"), Some(40.0));
}

#[test]
fn rate_join_filters_each_side_on_its_own_ingredient() {
    // the numerator lives on the right, so the left keeps its latest row with a population
    let left = csv("iso_code,date,population\nA,2021-01-01,200\nA,2021-02-01,0\n");
    let right = csv("c3,gini,total\nA,40,50\n");
    let recs = dated_rate_join(ColumnRef::right("total"), ColumnRef::left("population")).records(&left, &right).unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].value("rate"), Some(0.25));

    let unrated = csv("c3,gini,total\nA,40,0\n");
    assert!(dated_rate_join(ColumnRef::right("total"), ColumnRef::left("population")).records(&left, &unrated).unwrap().is_empty());
}

#[tokio::test]
async fn heatmap_follows_category_list_then_date() {
    let src = MemorySource::new().with(
        "age.csv",
        "age_group,date,people_vaccinated_per_hundred\n\
         18-29,2021-02-01,5\n\
         60-69,2021-01-01,9\n\
         18-29,2021-01-01,2\n\
         30-39,2021-01-01,\n",
    );
    let spec = ChartSpec::CategoryHeatmap(CategoryHeatmap {
        source: SourceSpec::csv("age.csv"),
        category_column: "age_group".into(),
        date_column: "date".into(),
        value_column: "people_vaccinated_per_hundred".into(),
        categories: vec!["30-39".into(), "18-29".into(), "40-49".into()],
    });
    let recs = records(spec.execute(&src).await.unwrap());
    let cells: Vec<(&str, &str, f64)> = recs
        .iter()
        .map(|r| (r.entity.as_str(), r.group.as_deref().unwrap_or(""), r.value("people_vaccinated_per_hundred").unwrap_or(-1.0)))
        .collect();
    assert_eq!(
        cells,
        vec![("30-39", "2021-01-01", 0.0), ("18-29", "2021-01-01", 2.0), ("18-29", "2021-02-01", 5.0)]
    );
}

#[tokio::test]
async fn schema_mismatch_is_an_error_not_empty() {
    let src = MemorySource::new().with("age.csv", "age_group,date\n18-29,2021-01-01\n");
    let spec = ChartSpec::CategoryHeatmap(CategoryHeatmap {
        source: SourceSpec::csv("age.csv"),
        category_column: "age_group".into(),
        date_column: "date".into(),
        value_column: "people_vaccinated_per_hundred".into(),
        categories: vec!["18-29".into()],
    });
    let err = spec.execute(&src).await.unwrap_err();
    assert_eq!(err.code_str(), "schema_error");
    assert!(err.to_string().contains("people_vaccinated_per_hundred"));
}

#[test]
fn dashboard_json_round_trips_chart_kinds() {
    let text = r#"{"charts": [
        {"name": "ages", "chart": {
            "kind": "category_heatmap",
            "source": {"location": "age.csv", "schema": [{"name": "date", "type": "date"}]},
            "category_column": "age_group",
            "date_column": "date",
            "value_column": "v",
            "categories": ["18-29"]
        }},
        {"name": "gdp", "chart": {
            "kind": "box_plot",
            "source": {"location": "v.json", "format": {"type": "json_series", "field": "data"}},
            "band_column": "b",
            "width": 10,
            "value_column": "g"
        }}
    ]}"#;
    let d = Dashboard::from_json(text).unwrap();
    assert_eq!(d.charts.len(), 2);
    assert_eq!(d.charts[0].chart.kind(), "category_heatmap");
    match &d.charts[1].chart {
        ChartSpec::BoxPlot(b) => {
            assert_eq!(b.source.format, SourceFormat::JsonSeries { field: "data".into() });
            assert!(b.require.is_empty());
        }
        other => panic!("unexpected chart {:?}", other),
    }
    assert!(matches!(d.charts[1].chart.empty_output(), ChartOutput::Boxes(_)));

    let err = Dashboard::from_json(r#"{"charts": [{"name": "x", "chart": {"kind": "pie"}}]}"#).unwrap_err();
    assert_eq!(err.code_str(), "config_error");
}
