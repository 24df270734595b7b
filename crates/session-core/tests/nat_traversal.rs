//! NAT traversal as driven by a started session

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use pretty_assertions::assert_eq;
use sipcam_ice_core::{StunMessage, StunMessageType};
use sipcam_session_core::MediaKind;

use common::*;

fn decode(data: &[u8]) -> StunMessage {
    StunMessage::decode(data).expect("valid STUN")
}

#[tokio::test(start_paused = true)]
async fn latching_probes_all_four_endpoints_each_interval() {
    let harness = Harness::new(vec![Ok(latch_description())]).await;
    let remote = harness.session.start(None).await.expect("start");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let audio_targets: Vec<SocketAddr> = harness.audio.sent_stun().into_iter().map(|(_, to)| to).collect();
    let video_targets: Vec<SocketAddr> = harness.video.sent_stun().into_iter().map(|(_, to)| to).collect();
    assert_eq!(
        audio_targets,
        vec![remote.rtp_addr(MediaKind::Audio), remote.rtcp_addr(MediaKind::Audio)]
    );
    assert_eq!(
        video_targets,
        vec![remote.rtp_addr(MediaKind::Video), remote.rtcp_addr(MediaKind::Video)]
    );

    for (data, _) in harness.audio.sent_stun() {
        assert_eq!(decode(&data).msg_type, StunMessageType::BindingRequest);
    }

    // Next tick at 500ms
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(harness.audio.sent_stun().len(), 4);
    assert_eq!(harness.video.sent_stun().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn every_keep_alive_tick_uses_a_fresh_transaction() {
    let harness = Harness::new(vec![Ok(latch_description())]).await;
    harness.session.start(None).await.expect("start");
    tokio::time::sleep(Duration::from_millis(1600)).await;

    let mut transactions = Vec::new();
    for path in [&harness.audio, &harness.video] {
        let sent = path.sent_stun();
        // Four ticks at 0, 500, 1000 and 1500ms, RTP and RTCP each
        assert_eq!(sent.len(), 8);
        for tick in sent.chunks(2) {
            let rtp = decode(&tick[0].0).transaction_id;
            let rtcp = decode(&tick[1].0).transaction_id;
            assert_eq!(rtp, rtcp);
            transactions.push(rtp);
        }
    }

    let mut distinct = transactions.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), transactions.len());
}

#[tokio::test(start_paused = true)]
async fn inbound_packet_stops_only_that_legs_latch_stream() {
    let harness = Harness::new(vec![Ok(latch_description())]).await;
    let remote = harness.session.start(None).await.expect("start");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let video_latch = harness.video.sent_media();
    assert!(!video_latch.is_empty());
    assert!(video_latch.iter().all(|(_, to)| *to == remote.rtp_addr(MediaKind::Video)));
    // Video latch packets start at sequence 99
    assert_eq!(u16::from_be_bytes([video_latch[0].0[2], video_latch[0].0[3]]), 99);

    harness
        .video
        .inject(&[0x80, 0x63, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 1], remote.rtp_addr(MediaKind::Video));
    settle().await;

    let video_after_inbound = harness.video.sent_media().len();
    let audio_after_inbound = harness.audio.sent_media().len();
    let keep_alives = harness.video.sent_stun().len();

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(harness.video.sent_media().len(), video_after_inbound);
    assert!(harness.audio.sent_media().len() > audio_after_inbound);
    // Keep-alive keeps running on both legs
    assert!(harness.video.sent_stun().len() > keep_alives);
}

#[tokio::test(start_paused = true)]
async fn latching_never_sends_connectivity_checks() {
    let harness = Harness::new(vec![Ok(latch_description())]).await;
    harness.session.start(None).await.expect("start");
    tokio::time::sleep(Duration::from_secs(2)).await;

    for (data, _) in harness.audio.sent_stun().into_iter().chain(harness.video.sent_stun()) {
        assert_eq!(decode(&data).username(), None);
    }
}

#[tokio::test(start_paused = true)]
async fn ice_sends_one_authenticated_binding_request_per_leg() {
    let harness = Harness::new(vec![Ok(ice_description())]).await;
    let remote = harness.session.start(None).await.expect("start");

    // Long enough for the binding requests to time out and for any
    // keep-alive timer to have fired several times
    tokio::time::sleep(Duration::from_secs(5)).await;

    for (path, kind) in [(&harness.audio, MediaKind::Audio), (&harness.video, MediaKind::Video)] {
        let sent = path.sent();
        assert_eq!(sent.len(), 1, "{} sent {:?}", kind, sent);

        let (data, target) = &sent[0];
        assert_eq!(*target, remote.rtp_addr(kind));
        let request = decode(data);
        assert_eq!(request.msg_type, StunMessageType::BindingRequest);
        assert_eq!(request.username(), Some(format!("abc:{}", local_ufrag(kind)).as_str()));
        assert!(sipcam_ice_core::verify_message_integrity(data, b"xyz").expect("integrity"));
    }
}

#[tokio::test(start_paused = true)]
async fn ice_responder_answers_binding_requests() {
    let harness = Harness::new(vec![Ok(ice_description())]).await;
    harness.session.start(None).await.expect("start");
    settle().await;

    let peer: SocketAddr = "203.0.113.10:20002".parse().expect("addr");
    let request = StunMessage::binding_request();
    let forwarded = harness.video.inject(&request.encode(), peer);
    assert_eq!(forwarded, None);
    settle().await;

    let replies: Vec<StunMessage> = harness
        .video
        .sent_stun()
        .into_iter()
        .filter(|(_, to)| *to == peer)
        .map(|(data, _)| decode(&data))
        .filter(|message| message.msg_type == StunMessageType::BindingResponse)
        .collect();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].transaction_id, request.transaction_id);

    // Garbage with a STUN cookie is swallowed
    harness
        .audio
        .inject(&[0x00, 0x01, 0x00, 0x04, 0x21, 0x12, 0xA4, 0x42, 0xFF, 0xFF], peer);
    settle().await;
    assert!(!harness.session.is_ended());
}
