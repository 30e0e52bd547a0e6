// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the subcommands.

use std::fmt::Write;
use std::process;

use anyhow::{anyhow, Context, Result};
use env_logger::Env;
use log::{error, info};

use quandary_resolv::message::{Message, Question, Record, MAX_MESSAGE_SIZE};
use quandary_resolv::rr::text::{parse_rdata, DisplayRdata};
use quandary_resolv::rr::{Class, Ttl, Type};
use quandary_resolv::resolver::Resolver;
use quandary_resolv::update::{UpdateOp, UpdateRecord, Updater};
use quandary_resolv::zonecut::{find_zone_cut, AddressFamily, ZoneCutOptions};

use crate::args::{Args, Command, QueryArgs, RecordSpec, UpdateArgs, ZoneArgs};
use crate::config::{self, Config};

/// Runs the command given on the command line.
pub fn run(args: Args) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        error!("{}", message);
        process::exit(1);
    }
}

fn try_running(args: Args) -> Result<()> {
    let config = config::load(&args).context("failed to load the configuration")?;
    let mut resolver = Resolver::new(config.resolver_config());
    match args.command {
        Command::Query(query_args) => query(&mut resolver, query_args),
        Command::Zone(zone_args) => zone(&mut resolver, zone_args),
        Command::Update(update_args) => update(&mut resolver, &config, update_args),
    }
}

////////////////////////////////////////////////////////////////////////
// QUERY                                                              //
////////////////////////////////////////////////////////////////////////

fn query(resolver: &mut Resolver, args: QueryArgs) -> Result<()> {
    if args.norecurse {
        let mut resolver_config = resolver.config().clone();
        resolver_config.recurse = false;
        resolver.set_config(resolver_config);
    }
    let question = Question::new(args.name, args.rr_type, args.class);
    let mut answer = vec![0; MAX_MESSAGE_SIZE];
    let len = resolver
        .query_raw(&question, &mut answer)
        .with_context(|| format!("failed to query {}", question))?;
    let message = Message::decode(&answer[..len]).context("failed to decode the reply")?;
    print_message(&message);
    Ok(())
}

fn print_message(message: &Message) {
    let header = &message.header;
    let mut flags = Vec::new();
    for (set, flag) in [
        (header.qr, "qr"),
        (header.aa, "aa"),
        (header.tc, "tc"),
        (header.rd, "rd"),
        (header.ra, "ra"),
    ] {
        if set {
            flags.push(flag);
        }
    }
    println!(
        ";; id {}, opcode {}, rcode {}, flags: {}",
        header.id,
        header.opcode,
        header.rcode,
        flags.join(" ")
    );
    for question in &message.questions {
        println!(";{}", question);
    }
    for (title, records) in [
        ("ANSWER", &message.answers),
        ("AUTHORITY", &message.authority),
        ("ADDITIONAL", &message.additional),
    ] {
        if !records.is_empty() {
            println!("\n;; {}", title);
            for record in records.iter() {
                println!("{}", format_record(record));
            }
        }
    }
}

fn format_record(record: &Record) -> String {
    let rdata = match record.rr_type {
        Type::NS | Type::CNAME | Type::PTR => record
            .rdata_name(0)
            .ok()
            .filter(|(_, len)| *len == record.rdata.len())
            .map(|(name, _)| name.to_string()),
        _ => None,
    };
    let rdata = rdata.unwrap_or_else(|| {
        DisplayRdata {
            rr_type: record.rr_type,
            rdata: record.rdata,
        }
        .to_string()
    });
    format!(
        "{} {} {} {} {}",
        record.owner, record.ttl, record.class, record.rr_type, rdata
    )
}

////////////////////////////////////////////////////////////////////////
// ZONE                                                               //
////////////////////////////////////////////////////////////////////////

fn zone(resolver: &mut Resolver, args: ZoneArgs) -> Result<()> {
    let family = if args.ipv4 {
        AddressFamily::V4Only
    } else if args.ipv6 {
        AddressFamily::V6Only
    } else {
        AddressFamily::Both
    };
    let options = ZoneCutOptions {
        exhaustive: args.exhaustive,
        family,
        ..Default::default()
    };
    let found = find_zone_cut(resolver, &args.name, args.class, &options, None)
        .with_context(|| format!("failed to find the zone of {}", args.name))?;
    println!("{}", found.cut);
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// UPDATE                                                             //
////////////////////////////////////////////////////////////////////////

fn update(resolver: &mut Resolver, config: &Config, args: UpdateArgs) -> Result<()> {
    let records = update_records(&args, Ttl::from(config.default_ttl))?;
    if records.is_empty() {
        return Err(anyhow!("no update records given"));
    }
    let keys = config.key_store()?;
    let updates = Updater::new()
        .with_keys(&keys)
        .allow_multiple_zones(args.multi_zone)
        .update(resolver, &records)
        .context("failed to update")?;
    for update in updates {
        info!(
            "Updated {} {} ({}).",
            update.origin,
            update.class,
            if update.signed { "signed" } else { "unsigned" }
        );
        println!("{} {}: updated", update.origin, update.class);
    }
    Ok(())
}

/// Turns the record options into update records. Prerequisites come
/// first, though the message layout does not depend on it.
fn update_records(args: &UpdateArgs, default_ttl: Ttl) -> Result<Vec<UpdateRecord>> {
    let class = args.class;
    let mut records = Vec::new();
    for given in &args.require {
        records.push(match (given.rr_type, &given.rdata) {
            (None, _) => bare(given, class, Type::ANY, UpdateOp::NameInUse),
            (Some(rr_type), None) => bare(given, class, rr_type, UpdateOp::RrsetExists),
            (Some(_), Some(_)) => with_rdata(given, class, Ttl::ZERO, UpdateOp::RrsetExists)?,
        });
    }
    for given in &args.prohibit {
        records.push(match (given.rr_type, &given.rdata) {
            (None, _) => bare(given, class, Type::ANY, UpdateOp::NameNotInUse),
            (Some(rr_type), None) => bare(given, class, rr_type, UpdateOp::RrsetDoesNotExist),
            (Some(_), Some(_)) => {
                return Err(anyhow!("a prohibited RRset cannot have RDATA: {}", given.owner))
            }
        });
    }
    for given in &args.delete {
        records.push(match (given.rr_type, &given.rdata) {
            (None, _) => bare(given, class, Type::ANY, UpdateOp::DeleteAll),
            (Some(rr_type), None) => bare(given, class, rr_type, UpdateOp::DeleteRrset),
            (Some(_), Some(_)) => with_rdata(given, class, Ttl::ZERO, UpdateOp::Delete)?,
        });
    }
    for given in &args.replace {
        let ttl = given.ttl.map(Ttl::from).unwrap_or(default_ttl);
        records.push(with_rdata(given, class, ttl, UpdateOp::Modify)?);
    }
    for given in &args.add {
        let ttl = given.ttl.map(Ttl::from).unwrap_or(default_ttl);
        records.push(with_rdata(given, class, ttl, UpdateOp::Add)?);
    }
    Ok(records)
}

fn bare(given: &RecordSpec, class: Class, rr_type: Type, op: UpdateOp) -> UpdateRecord {
    UpdateRecord::new(given.owner.clone(), class, rr_type, Ttl::ZERO, op, Vec::new())
}

fn with_rdata(given: &RecordSpec, class: Class, ttl: Ttl, op: UpdateOp) -> Result<UpdateRecord> {
    let (rr_type, text) = match (given.rr_type, &given.rdata) {
        (Some(rr_type), Some(text)) => (rr_type, text),
        _ => return Err(anyhow!("{} needs a type and RDATA: {}", op, given.owner)),
    };
    let rdata = parse_rdata(rr_type, text)
        .with_context(|| format!("invalid RDATA for {} {}", given.owner, rr_type))?;
    Ok(UpdateRecord::new(given.owner.clone(), class, rr_type, ttl, op, rdata))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_args(line: &[&str]) -> UpdateArgs {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: UpdateArgs,
        }

        let mut argv = vec!["update"];
        argv.extend_from_slice(line);
        Wrapper::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn record_options_become_update_records() {
        let args = update_args(&[
            "--add",
            "www.quandary.test. A 192.0.2.1",
            "--delete",
            "old.quandary.test.",
            "--require",
            "quandary.test. SOA",
            "--replace",
            "txt.quandary.test. 60 TXT hello",
        ]);
        let records = update_records(&args, Ttl::from(3600)).unwrap();
        let ops: Vec<_> = records.iter().map(|r| r.op).collect();
        assert_eq!(
            ops,
            vec![
                UpdateOp::RrsetExists,
                UpdateOp::DeleteAll,
                UpdateOp::Modify,
                UpdateOp::Add
            ]
        );
        assert_eq!(records[2].ttl, Ttl::from(60));
        assert_eq!(records[2].rdata, b"\x05hello");
        assert_eq!(records[3].ttl, Ttl::from(3600));
        assert_eq!(records[3].rdata, b"\xc0\x00\x02\x01");
    }

    #[test]
    fn additions_need_rdata() {
        let args = update_args(&["--add", "www.quandary.test. A"]);
        assert!(update_records(&args, Ttl::from(3600)).is_err());
        let args = update_args(&["--prohibit", "www.quandary.test. A 192.0.2.1"]);
        assert!(update_records(&args, Ttl::from(3600)).is_err());
    }
}
