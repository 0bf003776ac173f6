use std::net::SocketAddr;

use anyhow::Context;
use lanshare_protocols::netbios::{
    self, NodeName, PacketError, SUFFIX_FILE_SERVER, SUFFIX_WORKSTATION,
};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::commands::RespondArgs;

const MAX_DATAGRAM: usize = 1500;

/// Answers node-status requests with a fixed name table until Ctrl-C.
pub async fn respond(args: &RespondArgs, port: u16) -> anyhow::Result<()> {
    let table: Vec<NodeName> = vec![
        NodeName::unique(&args.name, SUFFIX_WORKSTATION),
        NodeName::unique(&args.name, SUFFIX_FILE_SERVER),
        NodeName::group(&args.workgroup, SUFFIX_WORKSTATION),
    ];
    // Reject names the codec cannot carry before binding anything.
    netbios::create_node_status_response(0, &table).context("invalid name table")?;

    let socket = UdpSocket::bind((args.bind, port))
        .await
        .with_context(|| format!("binding {}:{port}", args.bind))?;
    info!("answering node status queries as {} on {}", args.name, socket.local_addr()?);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("responder stopped");
                return Ok(());
            }
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(received) => received,
                    Err(err) => {
                        warn!("receive failed: {err}");
                        continue;
                    }
                };
                answer(&socket, &buf[..len], from, &table).await;
            }
        }
    }
}

async fn answer(socket: &UdpSocket, datagram: &[u8], from: SocketAddr, table: &[NodeName]) {
    let transaction_id: u16 = match netbios::parse_node_status_query(datagram) {
        Ok(id) => id,
        Err(PacketError::NotARequest) => return,
        Err(err) => {
            debug!("ignoring datagram from {from}: {err}");
            return;
        }
    };

    match netbios::create_node_status_response(transaction_id, table) {
        Ok(reply) => match socket.send_to(&reply, from).await {
            Ok(_) => debug!("answered {from} (id {transaction_id:#06x})"),
            Err(err) => warn!("reply to {from} failed: {err}"),
        },
        Err(err) => warn!("could not build reply: {err}"),
    }
}

