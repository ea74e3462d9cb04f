// SPDX-License-Identifier: MIT
//! Basic usage example for linked binary files

use bytemuck::{Pod, Zeroable};
use linked_binary_file::{FileBuilder, FileReader, ReaderConfig, HEADER_SIZE};

/// A string table entry: slot pointing at the text, then its length
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Entry {
    text: u64,
    len: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Linked Binary File - Basic Usage ===\n");

    // Step 1: Create blocks
    println!("1. Creating blocks...");
    let words = ["linked", "binary", "file"];
    let mut builder = FileBuilder::new();
    let texts = words
        .iter()
        .map(|w| builder.create_block(w.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut entries = Vec::new();
    for word in &words {
        let entry = Entry {
            text: 0,
            len: word.len() as u64,
        };
        entries.push(builder.create_block_from(&entry)?);
    }
    println!("   {} text blocks, {} entries", texts.len(), entries.len());

    // Step 2: Link every entry to its text
    println!("\n2. Creating links...");
    for (entry, text) in entries.iter().zip(&texts) {
        builder.create_link(*entry, 0, *text, 0)?;
    }

    // Step 3: Write to file
    println!("\n3. Writing to file...");
    let output_path = std::env::temp_dir().join("basic_usage.lbf");
    builder.write_to_file(&output_path)?;
    let header = builder.build()?;
    println!("   Written to: {}", output_path.display());
    println!("   File size: {} bytes", header.file_size);
    println!("   Header size: {} bytes", HEADER_SIZE);

    // Step 4: Read back and follow the links
    println!("\n4. Reading from file...");
    let reader = FileReader::open(&output_path)?;
    for &entry in &entries {
        let decoded: Entry = reader.read_at(entry as usize)?;
        let text = &reader.follow(entry)?[..decoded.len as usize];
        println!("   entry {} -> '{}'", entry, String::from_utf8_lossy(text));
    }

    // Step 5: Link in place
    println!("\n5. Linking in place...");
    let reader = FileReader::open_with(&output_path, ReaderConfig::in_place())?;
    for &entry in &entries {
        println!("   slot {} = {:#x}", entry, reader.slot(entry)?);
    }

    std::fs::remove_file(&output_path)?;
    println!("\n=== Linked Binary File Demo Complete ===");
    Ok(())
}
