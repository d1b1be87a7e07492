//! Reads produced reports back the way a host sender does.

use grbl_report::{
    state::{AxisMask, CoolantState, GcodeState, MachineSnapshot, MachineState, ProbeResult, SpindleState},
    BufferSink, MachineStateProvider, ReportConfig, ReportMask, Reporter, Settings, StatusCode,
};
use nom::{
    bytes::complete::{tag, take_until, take_while},
    combinator::{all_consuming, map_res, opt},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};

#[derive(Debug, PartialEq)]
enum Position {
    Machine(Vec<f64>),
    Work(Vec<f64>),
}

#[derive(Debug)]
struct HostStatus {
    state: String,
    sub_state: Option<u64>,
    position: Position,
    fields: Vec<(String, String)>,
}

impl HostStatus {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(head, _)| head == name)
            .map(|(_, value)| value.as_str())
    }
}

fn parse_f64(input: &str) -> IResult<&str, f64> {
    map_res(
        take_while(|c: char| c.is_ascii_digit() || c == '.' || c == '-'),
        |text: &str| text.parse::<f64>(),
    )
    .parse(input)
}

fn parse_u64(input: &str) -> IResult<&str, u64> {
    map_res(take_while(|c: char| c.is_ascii_digit()), |text: &str| text.parse::<u64>()).parse(input)
}

fn parse_float_array(input: &str) -> IResult<&str, Vec<f64>> {
    separated_list1(tag(","), parse_f64).parse(input)
}

fn parse_state(input: &str) -> IResult<&str, (String, Option<u64>)> {
    let (input, name) = take_while(|c: char| c.is_ascii_alphabetic())(input)?;
    let (input, sub_state) = opt(preceded(tag(":"), parse_u64))(input)?;
    Ok((input, (name.to_string(), sub_state)))
}

fn parse_position(input: &str) -> IResult<&str, Position> {
    let machine = preceded(tag("|MPos:"), parse_float_array).map(Position::Machine);
    let work = preceded(tag("|WPos:"), parse_float_array).map(Position::Work);
    machine.or(work).parse(input)
}

fn parse_field(input: &str) -> IResult<&str, (String, String)> {
    let (input, head) = preceded(tag("|"), terminated(take_until(":"), tag(":")))(input)?;
    let (input, value) = take_while(|c: char| c != '|' && c != '>')(input)?;
    Ok((input, (head.to_string(), value.to_string())))
}

type StatusBody = ((String, Option<u64>), Position, Vec<(String, String)>);

fn parse_status_body(input: &str) -> IResult<&str, StatusBody> {
    let (input, state) = parse_state(input)?;
    let (input, position) = parse_position(input)?;
    let (input, fields) = many0(parse_field)(input)?;
    Ok((input, (state, position, fields)))
}

fn parse_status(input: &str) -> IResult<&str, HostStatus> {
    let (rest, (state, position, fields)) = all_consuming(terminated(
        delimited(tag("<"), parse_status_body, tag(">")),
        tag("\r\n"),
    ))(input)?;
    Ok((
        rest,
        HostStatus {
            state: state.0,
            sub_state: state.1,
            position,
            fields,
        },
    ))
}

fn parse_head_and_body(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, head) = terminated(take_until(":"), tag(":"))(input)?;
    let (input, body) = take_until("]")(input)?;
    Ok((input, (head, body)))
}

fn parse_bracketed(input: &str) -> IResult<&str, (&str, &str)> {
    all_consuming(delimited(tag("["), parse_head_and_body, tag("]")))(input)
}

fn parse_probe_body(input: &str) -> IResult<&str, (Vec<f64>, u64)> {
    let (input, position) = parse_float_array(input)?;
    let (input, succeeded) = preceded(tag(":"), parse_u64)(input)?;
    Ok((input, (position, succeeded)))
}

struct Machine {
    snapshot: MachineSnapshot,
    gcode: GcodeState,
    settings: Settings,
}

impl MachineStateProvider for Machine {
    fn snapshot(&self) -> MachineSnapshot {
        self.snapshot
    }
    fn gcode_state(&self) -> &GcodeState {
        &self.gcode
    }
    fn settings(&self) -> &Settings {
        &self.settings
    }
    fn probe(&self) -> ProbeResult {
        ProbeResult { position: [250, 500, -750, 0, 0, 0], succeeded: true }
    }
}

fn busy_machine() -> Machine {
    let mut snapshot = MachineSnapshot {
        state: MachineState::Hold { holding_state: 1 },
        position: [12_500, -2_500, 375, 0, 0, 0],
        planner_blocks_available: 14,
        rx_buffer_available: 900,
        current_line_number: Some(120),
        realtime_feed_rate: 750.0,
        spindle_rpm: 9000.0,
        spindle_actual_rpm: Some(8990.0),
        spindle: SpindleState { on: true, ccw: false },
        coolant: CoolantState { flood: true, mist: false },
        ..MachineSnapshot::default()
    };
    snapshot.pins.limits = AxisMask(0b100);
    snapshot.pins.control.feed_hold = true;
    let mut gcode = GcodeState::default();
    gcode.coord_system_offset = [10.0, -5.0, 1.0, 0.0, 0.0, 0.0];
    Machine {
        snapshot,
        gcode,
        settings: Settings {
            status_report: ReportMask::from_bits(0x7e),
            ..Settings::default()
        },
    }
}

#[test]
fn status_frames_parse_across_refresh_cycle() {
    let machine = busy_machine();
    let mut reporter = Reporter::new(ReportConfig::standard_3_axis());
    let mut sink = BufferSink::new();
    let mut saw_wco = 0;
    let mut saw_overrides = 0;

    for _ in 0..40 {
        reporter.realtime_status(&machine, &mut sink);
        let (text, _) = sink.take();
        let (_, status) = parse_status(&text).unwrap_or_else(|err| panic!("{}: {:?}", text, err));

        assert_eq!(status.state, "Hold");
        assert_eq!(status.sub_state, Some(0));
        assert_eq!(status.position, Position::Work(vec![40.0, -5.0, 0.5]));
        assert_eq!(status.field("Bf"), Some("14,900"));
        assert_eq!(status.field("Ln"), Some("120"));
        assert_eq!(status.field("FS"), Some("750,9000,8990"));
        assert_eq!(status.field("Pn"), Some("ZH"));

        if let Some(wco) = status.field("WCO") {
            assert_eq!(wco, "10.000,-5.000,1.000");
            assert!(status.field("Ov").is_none());
            saw_wco += 1;
        }
        if let Some(overrides) = status.field("Ov") {
            assert_eq!(overrides, "100,100,100");
            assert_eq!(status.field("A"), Some("SF"));
            saw_overrides += 1;
        }
    }

    // Busy intervals: WCO every 30 frames, overrides every 20 but never alongside WCO.
    assert_eq!(saw_wco, 2);
    assert_eq!(saw_overrides, 2);
}

#[test]
fn minimal_frame_parses() {
    let mut machine = busy_machine();
    machine.snapshot = MachineSnapshot::default();
    machine.settings.status_report = ReportMask { machine_position: true, ..ReportMask::default() };
    let mut reporter = Reporter::new(ReportConfig::standard_4_axis());
    let mut sink = BufferSink::new();
    reporter.realtime_status(&machine, &mut sink);
    let (_, status) = parse_status(sink.as_str()).unwrap();
    assert_eq!(status.state, "Idle");
    assert_eq!(status.position, Position::Machine(vec![0.0; 4]));
    assert!(status.fields.is_empty());
}

#[test]
fn bracketed_reports_parse() {
    let machine = busy_machine();
    let reporter = Reporter::new(ReportConfig::standard_3_axis());
    let mut sink = BufferSink::new();

    reporter.gcode_modes(&machine, &mut sink);
    reporter.build_info("bench", &mut sink);
    reporter.help(&mut sink);
    let lines: Vec<(String, String)> = sink
        .lines()
        .map(|line| {
            let (_, (head, body)) = parse_bracketed(line).unwrap();
            (head.to_string(), body.to_string())
        })
        .collect();
    let heads: Vec<&str> = lines.iter().map(|(head, _)| head.as_str()).collect();
    assert_eq!(heads, ["GC", "VER", "OPT", "HLP"]);
    assert!(lines[0].1.starts_with("G0 G54 "));
    assert!(lines[1].1.ends_with(":bench"));
}

#[test]
fn probe_line_reads_back() {
    struct Store;
    impl grbl_report::SettingsStore for Store {
        fn read_coord_data(
            &self,
            _slot: grbl_report::CoordinateSlot,
        ) -> Result<grbl_report::state::AxisArray, grbl_report::SettingsReadError> {
            Ok([0.0; 6])
        }
    }

    let machine = busy_machine();
    let reporter = Reporter::new(ReportConfig::standard_3_axis());
    let mut sink = BufferSink::new();
    reporter.ngc_parameters(&machine, &Store, &mut sink).unwrap();
    let last = sink.lines().last().unwrap().to_string();
    let (_, (head, body)) = parse_bracketed(&last).unwrap();
    assert_eq!(head, "PRB");
    let (_, (position, succeeded)) = all_consuming(parse_probe_body)(body).unwrap();
    assert_eq!(position, vec![1.0, 2.0, -3.0]);
    assert_eq!(succeeded, 1);
}

#[test]
fn acknowledgments_parse() {
    let reporter = Reporter::new(ReportConfig::standard_3_axis());
    let mut sink = BufferSink::new();
    for status in StatusCode::ALL {
        reporter.status_message(status, &mut sink);
        let (text, _) = sink.take();
        let line = text.trim_end_matches("\r\n");
        let parsed: IResult<&str, Option<u64>> =
            all_consuming(tag("ok").map(|_| None).or(preceded(tag("error:"), parse_u64).map(Some)))(line);
        let (_, code) = parsed.unwrap();
        assert_eq!(code.unwrap_or(0), u64::from(status.code()));
    }
}
