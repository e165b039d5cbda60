use std::net::SocketAddr;
use std::time::Duration;

use aloha_simulator::devices::SlotOutcome;
use aloha_simulator::layers::datalink::{encode, NOISE_FRAME};
use aloha_simulator::{
    Channel, ChannelConfig, FrameHeader, MacAddr, Simulateable, Station, StationConfig,
    HEADER_SIZE, MAX_FRAME_SIZE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

const SLOT: Duration = Duration::from_millis(20);

async fn channel() -> (Channel<TcpListener>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ChannelConfig::new(addr.port(), SLOT);
    (Channel::new(listener, &config), addr)
}

/// Runs slots until `n` stations are registered
async fn admit(channel: &mut Channel<TcpListener>, n: usize) {
    for _ in 0..100 {
        if channel.registry().len() >= n {
            return;
        }
        channel.tick().await;
    }
    panic!("only {} of {} stations admitted", channel.registry().len(), n);
}

fn data_frame(station: u32, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader::data(
        MacAddr::station(station),
        MacAddr::CHANNEL,
        0,
        payload.len() as u16,
    );
    encode(&header, payload, MAX_FRAME_SIZE).unwrap()
}

#[tokio::test]
async fn test_two_stations_collide() {
    let (mut channel, addr) = channel().await;
    let mut a = TcpStream::connect(addr).await.unwrap();
    let mut b = TcpStream::connect(addr).await.unwrap();
    admit(&mut channel, 2).await;

    a.write_all(&data_frame(1, b"from a")).await.unwrap();
    b.write_all(&data_frame(2, b"from b")).await.unwrap();

    let mut outcome = SlotOutcome::Idle;
    for _ in 0..10 {
        outcome = channel.tick().await;
        if outcome != SlotOutcome::Idle {
            break;
        }
    }
    assert_eq!(outcome, SlotOutcome::Collision(2));

    for stream in [&mut a, &mut b] {
        let mut noise = [0u8; HEADER_SIZE];
        stream.read_exact(&mut noise).await.unwrap();
        assert_eq!(noise, NOISE_FRAME);
    }

    let report = channel.report();
    assert_eq!(report.stations.len(), 2);
    for station in &report.stations {
        assert_eq!(station.collisions, 1);
        assert_eq!(station.frames, 0);
    }
}

#[tokio::test]
async fn test_broadcast_reaches_every_station() {
    let (mut channel, addr) = channel().await;
    let mut streams = Vec::with_capacity(200);
    for _ in 0..200 {
        streams.push(TcpStream::connect(addr).await.unwrap());
    }
    admit(&mut channel, 200).await;

    let frame = data_frame(1, b"crowded medium");
    streams[0].write_all(&frame).await.unwrap();

    let mut outcome = SlotOutcome::Idle;
    for _ in 0..10 {
        outcome = channel.tick().await;
        if outcome != SlotOutcome::Idle {
            break;
        }
    }
    assert!(matches!(outcome, SlotOutcome::Success(_)));

    for (i, stream) in streams.iter_mut().enumerate() {
        let mut echo = vec![0u8; frame.len()];
        timeout(Duration::from_secs(2), stream.read_exact(&mut echo))
            .await
            .unwrap_or_else(|_| panic!("station {i} missed the echo"))
            .unwrap();
        assert_eq!(echo, frame);
    }
}

#[tokio::test]
async fn test_station_transfer_end_to_end() {
    let (mut channel, addr) = channel().await;
    let args = vec![
        "127.0.0.1".to_string(),
        addr.port().to_string(),
        "e2e.bin".to_string(),
        "30".to_string(),
        SLOT.as_millis().to_string(),
        "7".to_string(),
        "2".to_string(),
    ];
    let config = StationConfig::from_args(&args).unwrap();

    let stream = TcpStream::connect(addr).await.unwrap();
    let port = stream.local_addr().unwrap().port();
    let mut station = Station::new(stream, MacAddr::station(u32::from(port)), &config);

    let data = (0..100u8).collect::<Vec<_>>();
    let (_stop, shutdown) = watch::channel(false);
    let report = tokio::select! {
        report = station.transmit("e2e.bin", &data) => report,
        _ = channel.run(shutdown) => unreachable!(),
    };

    assert!(report.is_success(), "{report}");
    assert_eq!(report.frames_total, 10);
    assert_eq!(report.successful_frames, 10);
    assert_eq!(report.total_transmissions, 10);
    assert_eq!(report.delivered_bytes, 100);

    let summary = channel.report();
    assert_eq!(summary.stations.len(), 1);
    assert_eq!(summary.stations[0].frames, 10);
    assert_eq!(summary.stations[0].collisions, 0);
    assert_eq!(summary.stations[0].peer.port(), port);
}

#[tokio::test]
async fn test_departed_station_still_reported() {
    let (mut channel, addr) = channel().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    admit(&mut channel, 1).await;
    assert_eq!(channel.registry().active_count(), 1);

    drop(stream);
    for _ in 0..10 {
        channel.tick().await;
        if channel.registry().active_count() == 0 {
            break;
        }
    }
    assert_eq!(channel.registry().active_count(), 0);

    let report = channel.report();
    assert_eq!(report.stations.len(), 1);
    assert!(report.to_string().starts_with("From 127.0.0.1 port "));
}
