use std::{cell::RefCell, rc::Rc};

use futures::{executor::block_on, future::join_all, FutureExt};
use pretty_assertions::assert_eq;

use linebridge::{
    Commit, FrontEnd, GestureMap, Key, KeyEvent, LineBox, LineBridge, LineSource, OutputSink,
    StagingArea, Stream, TextField, Transcript, UiEvent,
};

fn collect(bridge: &LineBridge, n: usize) -> Rc<RefCell<Vec<(usize, String)>>> {
    let got = Rc::new(RefCell::new(Vec::new()));
    for i in 0..n {
        let got = got.clone();
        bridge.request_line_with(move |line| got.borrow_mut().push((i, line)));
    }
    got
}

#[test]
fn commits_then_reads_keep_commit_order() {
    let bridge = LineBridge::new();
    for line in ["a", "b", "c"] {
        bridge.commit(line.to_string());
    }

    let got = collect(&bridge, 3);
    assert_eq!(
        *got.borrow(),
        vec![(0, "a".to_string()), (1, "b".to_string()), (2, "c".to_string())]
    );
}

#[test]
fn interleaved_requests_and_commits() {
    let bridge = LineBridge::new();
    let got = Rc::new(RefCell::new(Vec::new()));
    let mut next_request = 0;

    // r = request, c = commit; the k-th request must get the k-th line.
    for (step, op) in "rccrrcrcc".chars().enumerate() {
        match op {
            'r' => {
                let got = got.clone();
                let k = next_request;
                next_request += 1;
                bridge.request_line_with(move |line| got.borrow_mut().push((k, line)));
            }
            _ => bridge.commit(format!("line{}", step)),
        }
        assert!(bridge.available() == 0 || bridge.pending() == 0);
    }

    let got = got.borrow();
    let lines: Vec<_> = got.iter().map(|(_, l)| l.as_str()).collect();
    let order: Vec<_> = got.iter().map(|(k, _)| *k).collect();

    assert_eq!(order, vec![0, 1, 2, 3]);
    assert_eq!(lines, vec!["line1", "line2", "line5", "line7"]);
    assert_eq!(bridge.available(), 1);
    assert_eq!(bridge.delivered(), 4);
}

#[test]
fn burst_ahead() {
    let bridge = LineBridge::new();
    let first = bridge.request_line();
    let second = bridge.request_line();
    assert_eq!(bridge.pending(), 2);

    for line in ["L1", "L2", "L3"] {
        bridge.commit(line.to_string());
    }

    assert_eq!(first.now_or_never().map(|r| r.ok()), Some(Some("L1".to_string())));
    assert_eq!(second.now_or_never().map(|r| r.ok()), Some(Some("L2".to_string())));
    assert_eq!(bridge.available(), 1);
    assert_eq!(bridge.pending(), 0);

    let third = block_on(bridge.request_line());
    assert_eq!(third.ok(), Some("L3".to_string()));
}

#[test]
fn every_line_delivered_once() {
    let bridge = LineBridge::new();
    let requests: Vec<_> = (0..50).map(|_| bridge.request_line()).collect();

    for n in 0..50 {
        bridge.commit(n.to_string());
    }

    let got: Vec<_> = block_on(join_all(requests))
        .into_iter()
        .filter_map(Result::ok)
        .collect();
    let expected: Vec<_> = (0..50).map(|n| n.to_string()).collect();

    assert_eq!(got, expected);
    assert_eq!(bridge.delivered(), 50);
    assert_eq!(bridge.available(), 0);
}

#[test]
fn empty_line_through_line_box() {
    let bridge = LineBridge::new();
    let mut front = LineBox::new(
        TextField::new(),
        LineSource::new(bridge.clone()),
        GestureMap::default(),
    );

    front.handle(UiEvent::Key(KeyEvent::plain(Key::Enter)));
    assert_eq!(bridge.available(), 1);

    let line = bridge.request_line().now_or_never();
    assert_eq!(line.map(|r| r.ok()), Some(Some(String::new())));
}

#[test]
fn upload_burst_feeds_waiting_reads() {
    let bridge = LineBridge::new();
    let got = collect(&bridge, 2);

    let mut front = StagingArea::new(TextField::new(), LineSource::new(bridge.clone()), None);
    front.widget_mut().type_str("one\ntwo\nthree\n");
    front.handle(UiEvent::Submit);

    assert_eq!(
        *got.borrow(),
        vec![(0, "one".to_string()), (1, "two".to_string())]
    );
    assert_eq!(bridge.available(), 1);
}

#[test]
fn echo_shares_the_output_sink() {
    let bridge = LineBridge::new();
    let output = Rc::new(RefCell::new(OutputSink::new(Transcript::new())));

    let echo = output.clone();
    let mut source =
        LineSource::new(bridge.clone()).with_echo(move |line| echo.borrow_mut().echo("> ", line));

    output.borrow_mut().write_str(Stream::Stdout, "name? ");
    source.on_commit("ada");

    let line = bridge.request_line().now_or_never().and_then(Result::ok);
    assert_eq!(line, Some("ada".to_string()));
    assert_eq!(
        output.borrow().display().lines(Stream::Stdout),
        vec!["name? ada"]
    );
}

#[test]
fn output_round_trip_and_isolation() {
    let mut out = OutputSink::new(Transcript::new());
    for c in "abc\n".chars() {
        out.write_char(Stream::Stdout, c as u32);
    }
    out.write_str(Stream::Stderr, "warn");
    for c in "def\n".chars() {
        out.write_char(Stream::Stdout, c as u32);
    }
    out.write_str(Stream::Stderr, "ing\n");

    assert_eq!(out.display().lines(Stream::Stdout), vec!["abc", "def"]);
    assert_eq!(out.display().lines(Stream::Stderr), vec!["warning"]);
    assert_eq!(out.pending(Stream::Stdout), "");
    assert_eq!(out.pending(Stream::Stderr), "");
}
