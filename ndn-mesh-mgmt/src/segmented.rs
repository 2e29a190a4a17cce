//! Segmented retrieval.
//!
//! The first packet tells us the last segment number through its
//! FinalBlockId; the remaining segments are requested concurrently and the
//! payloads are stitched together in segment order.

use bytes::BytesMut;
use futures::future::try_join_all;
use log::{debug, warn};
use ndn_mesh_common::{
    ndn::{Data, Interest, Name},
    Error, Result,
};

use crate::face::Face;

/// Most segments a single retrieval will request
pub const MAX_SEGMENTS: u64 = 65_536;

/// Whether the last component of `name` carries a segment marker
pub fn has_segment(name: &Name) -> bool {
    name.get_from_end(1)
        .map(|component| component.is_segment())
        .unwrap_or(false)
}

/// Fetch every segment of the object requested by `interest`.
///
/// `interest` should carry either a child selector or an explicit initial
/// segment number as its last name component. The returned Data is named
/// after the request without that segment component and holds the
/// concatenated content. A first packet without a usable FinalBlockId is
/// taken as the whole object. Any failing segment fails the retrieval, and
/// a FinalBlockId before the first segment or more than [`MAX_SEGMENTS`]
/// segments is an encoding error.
pub async fn fetch_segmented(face: &Face, interest: Interest, warn_unsegmented: bool) -> Result<Data> {
    let specified_segment = if has_segment(&interest.name) {
        interest
            .name
            .get_from_end(1)
            .and_then(|component| component.to_segment().ok())
    } else {
        None
    };

    if specified_segment.is_none() && interest.child_selector.is_none() {
        if warn_unsegmented {
            warn!(
                "[Segments] No child selector or segment number on {}; retrieval may be incorrect",
                interest.name
            );
        } else {
            debug!("[Segments] Unsegmented request for {}", interest.name);
        }
    }

    let base_name = match specified_segment {
        Some(_) => interest.name.prefix(interest.name.len() - 1),
        None => interest.name.clone(),
    };
    let first_segment = specified_segment.unwrap_or(0);

    let first = face.express_interest(interest.clone()).await?;

    let last_segment = match first
        .final_block_id
        .as_ref()
        .map(|component| component.to_segment())
    {
        Some(Ok(last)) => last,
        Some(Err(e)) => {
            debug!(
                "[Segments] Unparsable FinalBlockId on {}: {}; treating as one packet",
                first.name, e
            );
            first_segment
        }
        None => first_segment,
    };
    if last_segment < first_segment {
        return Err(Error::Encoding(format!(
            "FinalBlockId {} of {} is before segment {}",
            last_segment, first.name, first_segment
        )));
    }
    if last_segment - first_segment >= MAX_SEGMENTS {
        return Err(Error::Encoding(format!(
            "{} announces {} segments after {}, more than {} allowed",
            first.name,
            last_segment - first_segment,
            first_segment,
            MAX_SEGMENTS
        )));
    }

    let remaining = (first_segment.saturating_add(1)..=last_segment).map(|segment| {
        let segment_interest = Interest::new(base_name.append_segment(segment))
            .with_lifetime(interest.lifetime_ms)
            .with_must_be_fresh(interest.must_be_fresh);
        face.express_interest(segment_interest)
    });
    let rest = try_join_all(remaining).await?;

    debug!(
        "[Segments] Retrieved {} segment(s) of {}",
        rest.len() + 1,
        base_name
    );

    let mut content = BytesMut::with_capacity(first.content.len() * (rest.len() + 1));
    content.extend_from_slice(&first.content);
    for segment in &rest {
        content.extend_from_slice(&segment.content);
    }

    let mut data = Data::new(base_name, content.freeze());
    data.freshness_period_ms = first.freshness_period_ms;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::spawn_event_pump;
    use crate::memory::MemoryForwarder;
    use bytes::Bytes;
    use ndn_mesh_common::ndn::{ChildSelector, NameComponent};
    use std::{sync::Arc, time::Duration};

    /// Serves `content` as `segment_size` chunks under `prefix`, answering
    /// the highest segment number last so arrival order differs from
    /// segment order.
    async fn serve(forwarder: &MemoryForwarder, prefix: Name, content: Vec<u8>, segment_size: usize) {
        let producer = Arc::new(Face::new(Arc::new(forwarder.connect())));
        spawn_event_pump(producer.clone(), Duration::from_millis(1));
        let mut interests = producer.register_prefix(&prefix).await.unwrap();

        let chunks: Vec<Bytes> = content
            .chunks(segment_size)
            .map(|chunk| Bytes::copy_from_slice(chunk))
            .collect();
        let last = chunks.len() as u64 - 1;

        tokio::spawn(async move {
            while let Some(interest) = interests.recv().await {
                let segment = if has_segment(&interest.name) {
                    interest.name.get_from_end(1).unwrap().to_segment().unwrap()
                } else {
                    0
                };
                let data = Data::new(
                    prefix.append_segment(segment),
                    chunks[segment as usize].clone(),
                )
                .with_final_block_id(NameComponent::from_segment(last));

                let producer = producer.clone();
                tokio::spawn(async move {
                    // later segments answer first
                    tokio::time::sleep(Duration::from_millis(20 * (last - segment))).await;
                    producer.put_data(data).await.unwrap();
                });
            }
        });
    }

    fn pumped_face(forwarder: &MemoryForwarder) -> Arc<Face> {
        let face = Arc::new(Face::new(Arc::new(forwarder.connect())));
        spawn_event_pump(face.clone(), Duration::from_millis(1));
        face
    }

    #[test]
    fn test_has_segment() {
        assert!(has_segment(&Name::new().append_str("a").append_segment(3)));
        assert!(!has_segment(&Name::from_uri("/a/b").unwrap()));
        assert!(!has_segment(&Name::new()));
    }

    #[tokio::test]
    async fn test_reassembles_in_segment_order() {
        let forwarder = MemoryForwarder::new();
        let prefix = Name::from_uri("/big/object").unwrap();
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        serve(&forwarder, prefix.clone(), content.clone(), 4096).await;

        let face = pumped_face(&forwarder);
        let interest = Interest::new(prefix.clone())
            .with_lifetime(2000)
            .with_child_selector(ChildSelector::Rightmost);
        let data = fetch_segmented(&face, interest, true).await.unwrap();

        assert_eq!(data.name, prefix);
        assert_eq!(data.content.as_ref(), content.as_slice());
    }

    #[tokio::test]
    async fn test_explicit_first_segment_is_stripped_from_name() {
        let forwarder = MemoryForwarder::new();
        let prefix = Name::from_uri("/big/object").unwrap();
        let content: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        serve(&forwarder, prefix.clone(), content.clone(), 100).await;

        let face = pumped_face(&forwarder);
        let interest = Interest::new(prefix.append_segment(1)).with_lifetime(2000);
        let data = fetch_segmented(&face, interest, true).await.unwrap();

        assert_eq!(data.name, prefix);
        assert_eq!(data.content.as_ref(), &content[100..]);
    }

    #[tokio::test]
    async fn test_missing_final_block_id_is_one_packet() {
        let forwarder = MemoryForwarder::new();
        let producer = pumped_face(&forwarder);
        let prefix = Name::from_uri("/single").unwrap();
        let mut interests = producer.register_prefix(&prefix).await.unwrap();
        tokio::spawn(async move {
            let interest = interests.recv().await.unwrap();
            producer
                .put_data(Data::new(interest.name.clone(), Bytes::from_static(b"only")))
                .await
                .unwrap();
        });

        let face = pumped_face(&forwarder);
        let interest = Interest::new(prefix.clone()).with_lifetime(2000);
        let data = fetch_segmented(&face, interest, false).await.unwrap();
        assert_eq!(data.content.as_ref(), b"only");
    }

    /// Answers every request under `prefix` with one packet whose
    /// FinalBlockId is `last`
    async fn serve_final_block(forwarder: &MemoryForwarder, prefix: Name, last: u64) {
        let producer = pumped_face(forwarder);
        let mut interests = producer.register_prefix(&prefix).await.unwrap();
        tokio::spawn(async move {
            while let Some(interest) = interests.recv().await {
                let data = Data::new(interest.name.clone(), Bytes::from_static(b"x"))
                    .with_final_block_id(NameComponent::from_segment(last));
                producer.put_data(data).await.unwrap();
            }
        });
    }

    #[tokio::test]
    async fn test_huge_final_block_id_is_rejected() {
        let forwarder = MemoryForwarder::new();
        let prefix = Name::from_uri("/endless").unwrap();
        serve_final_block(&forwarder, prefix.clone(), u64::MAX).await;

        let face = pumped_face(&forwarder);
        let interest = Interest::new(prefix)
            .with_lifetime(2000)
            .with_child_selector(ChildSelector::Rightmost);
        let err = fetch_segmented(&face, interest, true).await.unwrap_err();
        assert!(matches!(err, Error::Encoding(_)), "{}", err);
    }

    #[tokio::test]
    async fn test_final_block_id_before_first_segment_is_rejected() {
        let forwarder = MemoryForwarder::new();
        let prefix = Name::from_uri("/short").unwrap();
        serve_final_block(&forwarder, prefix.clone(), 1).await;

        let face = pumped_face(&forwarder);
        let interest = Interest::new(prefix.append_segment(3)).with_lifetime(2000);
        let err = fetch_segmented(&face, interest, true).await.unwrap_err();
        assert!(matches!(err, Error::Encoding(_)), "{}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_segment_fails_retrieval() {
        let forwarder = MemoryForwarder::new();
        let producer = pumped_face(&forwarder);
        let prefix = Name::from_uri("/holes").unwrap();
        let mut interests = producer.register_prefix(&prefix).await.unwrap();
        tokio::spawn(async move {
            while let Some(interest) = interests.recv().await {
                // only segment 0 is ever answered
                if has_segment(&interest.name) {
                    continue;
                }
                let data = Data::new(prefix.append_segment(0), Bytes::from_static(b"first"))
                    .with_final_block_id(NameComponent::from_segment(2));
                producer.put_data(data).await.unwrap();
            }
        });

        let face = pumped_face(&forwarder);
        let interest = Interest::new(Name::from_uri("/holes").unwrap())
            .with_lifetime(1000)
            .with_child_selector(ChildSelector::Rightmost);
        let err = fetch_segmented(&face, interest, true).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
